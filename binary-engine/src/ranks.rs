//! Rank qualification engine
//!
//! A participant's rank is re-derived from live data on every evaluation:
//! the smaller leg's unexpired point total against the tier thresholds,
//! plus structural leg requirements (minimum ranks that must exist
//! somewhere in each leg's subtree, in either orientation). The current
//! rank can move both ways; the max rank only ratchets up, and the
//! achievement bonus pays once per tier on that ratchet.

use crate::{
    bonds::BondEngine,
    error::{Error, Result},
    metrics::Metrics,
    plan::CompensationPlan,
    points::PointLedger,
    store::NetworkStore,
    types::{Participant, Position, Rank, RankEvaluation},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

/// Subtree scan node budget (cycle protection)
const MAX_SCAN_NODES: usize = 100_000;

/// Totals of one rank sweep
#[derive(Debug, Clone, Default)]
pub struct RankSweepReport {
    /// Participants evaluated
    pub swept: usize,

    /// New max-rank promotions
    pub promotions: usize,

    /// Evaluations that failed (logged, not fatal to the sweep)
    pub errors: usize,
}

/// Rank qualification engine
pub struct RankEngine {
    store: Arc<dyn NetworkStore>,
    points: PointLedger,
    bonds: Arc<BondEngine>,
    plan: Arc<CompensationPlan>,
    metrics: Metrics,
}

impl RankEngine {
    /// Create a new rank engine
    pub fn new(
        store: Arc<dyn NetworkStore>,
        points: PointLedger,
        bonds: Arc<BondEngine>,
        plan: Arc<CompensationPlan>,
    ) -> Self {
        Self {
            store,
            points,
            bonds,
            plan,
            metrics: Metrics::default(),
        }
    }

    /// Metrics handle (for registry scraping)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Derive the qualifying rank from live leg data, without persisting
    pub fn evaluate(&self, participant_id: Uuid, now: DateTime<Utc>) -> Result<RankEvaluation> {
        let participant = self
            .store
            .participant(participant_id)?
            .ok_or(Error::ParticipantNotFound(participant_id))?;

        let left = self
            .points
            .side_points(participant_id, Position::Left, now)?;
        let right = self
            .points
            .side_points(participant_id, Position::Right, now)?;
        let smaller = left.min(right);

        let mut qualified = Rank::Affiliate;
        for tier in self.plan.tiers_descending() {
            if smaller < tier.points_threshold {
                continue;
            }
            if self.legs_satisfy(&participant, tier.leg_requirement)? {
                qualified = tier.rank;
                break;
            }
        }

        let next_rank = qualified.next();
        let missing_points = match next_rank {
            Some(next) => {
                let threshold = self.plan.tier(next)?.points_threshold;
                (threshold - smaller).max(Decimal::ZERO)
            }
            None => Decimal::ZERO,
        };

        Ok(RankEvaluation {
            rank: qualified,
            next_rank,
            missing_points,
            order: qualified.order(),
        })
    }

    /// Re-evaluate and persist; pays the achievement bonus when the max
    /// rank ratchets up. Returns the newly achieved rank, if any.
    ///
    /// The rank write serializes through the shared participant lock so a
    /// bond distributed concurrently cannot have its cap update overwritten
    /// by a stale record. The lock is released before the bonus pays, since
    /// the bond engine takes it again.
    pub fn refresh(&self, participant_id: Uuid, now: DateTime<Utc>) -> Result<Option<Rank>> {
        let newly_achieved = {
            let lock = self.bonds.locks().lock(participant_id);
            let _guard = lock.lock();

            let evaluation = self.evaluate(participant_id, now)?;

            let mut participant = self
                .store
                .participant(participant_id)?
                .ok_or(Error::ParticipantNotFound(participant_id))?;

            let promoted = evaluation.rank > participant.max_rank;
            let changed = evaluation.rank != participant.rank || promoted;

            if changed {
                participant.rank = evaluation.rank;
                if promoted {
                    participant.max_rank = evaluation.rank;
                }
                self.store.put_participant(&participant)?;
            }

            promoted.then_some(evaluation.rank)
        };

        if let Some(rank) = newly_achieved {
            self.metrics.rank_promotions_total.inc();
            tracing::info!(
                participant_id = %participant_id,
                rank = %rank,
                "Rank promotion"
            );
            self.bonds.exec_rank(participant_id, rank)?;
            return Ok(Some(rank));
        }

        Ok(None)
    }

    /// Refresh every participant once; per-participant failures are logged
    /// and do not abort the sweep
    pub fn run_sweep(&self, now: DateTime<Utc>) -> Result<RankSweepReport> {
        let mut report = RankSweepReport::default();

        for participant_id in self.store.participant_ids()? {
            report.swept += 1;
            match self.refresh(participant_id, now) {
                Ok(Some(_)) => report.promotions += 1,
                Ok(None) => {}
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(
                        participant_id = %participant_id,
                        error = %e,
                        "Rank evaluation failed"
                    );
                }
            }
        }

        tracing::info!(
            swept = report.swept,
            promotions = report.promotions,
            errors = report.errors,
            "Rank sweep finished"
        );

        Ok(report)
    }

    /// Whether the two legs hold the required ranks in either orientation
    fn legs_satisfy(
        &self,
        participant: &Participant,
        requirement: Option<(Rank, Rank)>,
    ) -> Result<bool> {
        let (a, b) = match requirement {
            Some(pair) => pair,
            None => return Ok(true),
        };

        let left = participant.left_child_id;
        let right = participant.right_child_id;

        if a == b {
            return Ok(self.leg_has_rank(left, a)? && self.leg_has_rank(right, a)?);
        }

        Ok((self.leg_has_rank(left, a)? && self.leg_has_rank(right, b)?)
            || (self.leg_has_rank(left, b)? && self.leg_has_rank(right, a)?))
    }

    /// Whether any participant in the subtree holds at least `required`
    fn leg_has_rank(&self, root: Option<Uuid>, required: Rank) -> Result<bool> {
        let mut queue = VecDeque::new();
        if let Some(root) = root {
            queue.push_back(root);
        }

        let mut scanned = 0usize;
        while let Some(id) = queue.pop_front() {
            if scanned >= MAX_SCAN_NODES {
                tracing::warn!(
                    required = %required,
                    "Leg scan hit the node budget, treating requirement as unmet"
                );
                return Ok(false);
            }
            scanned += 1;

            let node = match self.store.participant(id)? {
                Some(node) => node,
                None => continue,
            };
            if node.rank >= required {
                return Ok(true);
            }
            if let Some(left) = node.left_child_id {
                queue.push_back(left);
            }
            if let Some(right) = node.right_child_id {
                queue.push_back(right);
            }
        }

        Ok(false)
    }
}

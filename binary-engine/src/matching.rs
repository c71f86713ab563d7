//! Binary matching engine
//!
//! Pairs the left and right point queues of a participant: the matchable
//! volume is the smaller of the two unexpired leg totals, consumed oldest
//! first from both legs in one atomic commit. Expired lots found during the
//! run are purged and forfeited in the same commit. The consumed volume
//! then pays a binary bond at the participant's rank percent.
//!
//! The commit that consumes the lots also records a match obligation; the
//! bond settles against it exactly once, keyed by the match ID. A crash
//! between the commit and the payout leaves the obligation open, and the
//! next run for that participant settles it before matching again.

use crate::{
    bonds::BondEngine,
    error::{Error, Result},
    metrics::Metrics,
    points::PointLedger,
    store::NetworkStore,
    types::{BondLedgerEntry, MatchObligation, PointLot, Position},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Result of one matching run for one participant
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Points consumed from each leg
    pub matched_points: Decimal,

    /// Expired lots purged during the run
    pub forfeited_lots: usize,

    /// The binary bond paid for the consumed volume, if any
    pub bond: Option<BondLedgerEntry>,
}

/// Totals of one sweep across the whole network
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Participants examined
    pub swept: usize,

    /// Participants with a non-zero match
    pub matched: usize,

    /// Participants whose run failed (logged, not fatal to the sweep)
    pub errors: usize,
}

/// Binary matching engine
pub struct MatchingEngine {
    store: Arc<dyn NetworkStore>,
    points: PointLedger,
    bonds: Arc<BondEngine>,
    metrics: Metrics,
}

impl MatchingEngine {
    /// Create a new matching engine
    pub fn new(store: Arc<dyn NetworkStore>, points: PointLedger, bonds: Arc<BondEngine>) -> Self {
        Self {
            store,
            points,
            bonds,
            metrics: Metrics::default(),
        }
    }

    /// Metrics handle (for registry scraping)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Match the two legs of one participant as of `now`
    ///
    /// Settles any obligation an earlier interrupted run left open before
    /// matching fresh volume.
    pub fn run_for(&self, participant_id: Uuid, now: DateTime<Utc>) -> Result<MatchOutcome> {
        self.store
            .participant(participant_id)?
            .ok_or(Error::ParticipantNotFound(participant_id))?;

        for leftover in self.store.open_obligations(participant_id)? {
            tracing::warn!(
                participant_id = %participant_id,
                match_id = %leftover.match_id,
                matched = %leftover.matched_points,
                "Settling match obligation left by an interrupted run"
            );
            self.settle(&leftover)?;
        }

        let (left_live, left_expired) =
            self.points.live_and_expired(participant_id, Position::Left, now)?;
        let (right_live, right_expired) =
            self.points.live_and_expired(participant_id, Position::Right, now)?;

        let left_total: Decimal = left_live.iter().map(|l| l.points).sum();
        let right_total: Decimal = right_live.iter().map(|l| l.points).sum();
        let matched = left_total.min(right_total);

        let forfeited = left_expired.len() + right_expired.len();
        let mut removed: Vec<PointLot> = Vec::new();
        removed.extend(left_expired);
        removed.extend(right_expired);
        let mut updated = Vec::new();

        if matched > Decimal::ZERO {
            consume_fifo(left_live, matched, &mut removed, &mut updated);
            consume_fifo(right_live, matched, &mut removed, &mut updated);
        }

        if removed.is_empty() && updated.is_empty() {
            return Ok(MatchOutcome {
                matched_points: Decimal::ZERO,
                forfeited_lots: 0,
                bond: None,
            });
        }

        // Consumption, forfeiture and the unsettled obligation land in one
        // batch, so the payout can never be lost to a crash
        let obligation = (matched > Decimal::ZERO).then(|| MatchObligation {
            match_id: Uuid::now_v7(),
            participant_id,
            matched_points: matched,
            created_at: now,
        });
        self.store
            .commit_match(participant_id, &removed, &updated, obligation.as_ref())?;

        if forfeited > 0 {
            tracing::info!(
                participant_id = %participant_id,
                forfeited,
                "Expired point lots purged"
            );
        }

        let bond = match &obligation {
            Some(ob) => {
                self.metrics.matches_total.inc();
                tracing::info!(
                    participant_id = %participant_id,
                    matched = %matched,
                    "Binary legs matched"
                );
                self.settle(ob)?
            }
            None => None,
        };

        Ok(MatchOutcome {
            matched_points: matched,
            forfeited_lots: forfeited,
            bond,
        })
    }

    /// Pay the binary bond for one obligation and delete it
    ///
    /// The bond is keyed by the match ID, so a settlement retried after a
    /// crash never pays twice.
    fn settle(&self, obligation: &MatchObligation) -> Result<Option<BondLedgerEntry>> {
        let key = format!("match:{}", obligation.match_id);
        let bond = self.bonds.exec_binary(
            obligation.participant_id,
            obligation.matched_points,
            &key,
        )?;
        self.store
            .settle_obligation(obligation.participant_id, obligation.match_id)?;
        Ok(bond)
    }

    /// Match every participant once; per-participant failures are logged
    /// and do not abort the sweep
    pub fn run_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for participant_id in self.store.participant_ids()? {
            report.swept += 1;
            match self.run_for(participant_id, now) {
                Ok(outcome) if outcome.matched_points > Decimal::ZERO => report.matched += 1,
                Ok(_) => {}
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(
                        participant_id = %participant_id,
                        error = %e,
                        "Matching run failed"
                    );
                }
            }
        }

        tracing::info!(
            swept = report.swept,
            matched = report.matched,
            errors = report.errors,
            "Matching sweep finished"
        );

        Ok(report)
    }
}

/// Consume `amount` points oldest-first: fully drained lots are removed,
/// a partially drained boundary lot is rewritten with its remainder
fn consume_fifo(
    lots: Vec<PointLot>,
    amount: Decimal,
    removed: &mut Vec<PointLot>,
    updated: &mut Vec<PointLot>,
) {
    let mut remaining = amount;

    for lot in lots {
        if remaining <= Decimal::ZERO {
            break;
        }
        if lot.points <= remaining {
            remaining -= lot.points;
            removed.push(lot);
        } else {
            let mut partial = lot;
            partial.points -= remaining;
            remaining = Decimal::ZERO;
            updated.push(partial);
        }
    }
}

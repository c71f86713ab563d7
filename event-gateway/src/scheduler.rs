//! Periodic compensation sweeps
//!
//! Matching and rank evaluation are batch processes: a tokio interval runs
//! them across the whole network. Operators can also trigger an ad-hoc
//! sweep between ticks.

use crate::error::Result;
use binary_engine::{MatchingEngine, RankEngine, RankSweepReport, SweepReport};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Sweep loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Seconds between automatic sweeps
    pub interval_secs: u64,

    /// Enable the automatic loop (ad-hoc triggers always work)
    pub auto_sweep: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            auto_sweep: true,
        }
    }
}

/// Combined result of one sweep pass
#[derive(Debug, Clone)]
pub struct SweepRun {
    /// Matching pass totals
    pub matching: SweepReport,

    /// Rank pass totals
    pub ranks: RankSweepReport,
}

/// Runs matching and rank sweeps on a schedule
pub struct SweepScheduler {
    matching: Arc<MatchingEngine>,
    ranks: Arc<RankEngine>,
    config: SweepConfig,
}

impl SweepScheduler {
    /// Create a new scheduler
    pub fn new(matching: Arc<MatchingEngine>, ranks: Arc<RankEngine>, config: SweepConfig) -> Self {
        Self {
            matching,
            ranks,
            config,
        }
    }

    /// Run the sweep loop until the task is aborted
    pub async fn start(self: Arc<Self>) {
        if !self.config.auto_sweep {
            info!("Automatic sweeps disabled");
            return;
        }

        info!(
            interval_secs = self.config.interval_secs,
            "Starting compensation sweep scheduler"
        );

        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(self.config.interval_secs));
        // The first tick fires immediately; skip it so startup does not
        // race event ingestion
        interval.tick().await;

        loop {
            interval.tick().await;
            if let Err(e) = self.run_once() {
                warn!(error = %e, "Sweep pass failed");
            }
        }
    }

    /// One full pass: match every participant, then refresh every rank
    ///
    /// Matching runs first so freshly consumed volume cannot promote a
    /// rank it no longer backs.
    pub fn run_once(&self) -> Result<SweepRun> {
        let now = Utc::now();

        let matching = self.matching.run_sweep(now)?;
        let ranks = self.ranks.run_sweep(now)?;

        Ok(SweepRun { matching, ranks })
    }

    /// Manual trigger between scheduled ticks
    pub fn trigger_adhoc(&self, requester: &str) -> Result<SweepRun> {
        info!(requester, "Ad-hoc sweep triggered");
        self.run_once()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binary_engine::{
        BondEngine, CompensationPlan, MemoryNetworkStore, NetworkStore, Participant, PointLedger,
        PointLot, Position, Rank,
    };
    use rust_decimal::Decimal;
    use uuid::Uuid;
    use wallet_core::{Currency, MemoryWalletStore, StaticResolver, WalletService};

    fn scheduler() -> (Arc<MemoryNetworkStore>, SweepScheduler) {
        let store = Arc::new(MemoryNetworkStore::new());
        let plan = Arc::new(CompensationPlan::default());
        let wallets = Arc::new(WalletService::new(
            Arc::new(MemoryWalletStore::new()),
            Arc::new(StaticResolver(Currency::USD)),
        ));
        let bonds = Arc::new(BondEngine::new(
            store.clone(),
            wallets,
            plan.clone(),
        ));
        let matching = Arc::new(MatchingEngine::new(
            store.clone(),
            PointLedger::new(store.clone(), plan.clone()),
            bonds.clone(),
        ));
        let ranks = Arc::new(RankEngine::new(
            store.clone(),
            PointLedger::new(store.clone(), plan.clone()),
            bonds,
            plan,
        ));
        (
            store.clone(),
            SweepScheduler::new(matching, ranks, SweepConfig::default()),
        )
    }

    fn seed(store: &MemoryNetworkStore, p: Uuid, side: Position, points: i64) {
        let lot = PointLot {
            lot_id: Uuid::now_v7(),
            participant_id: p,
            side,
            points: Decimal::from(points),
            source_event: format!("seed:{}", Uuid::new_v4()),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::days(60),
        };
        store.record_fanout(&lot.source_event, &[lot.clone()]).unwrap();
    }

    #[tokio::test]
    async fn test_run_once_matching_precedes_ranks() {
        let (store, scheduler) = scheduler();

        let mut p = Participant::new(Uuid::new_v4(), None, "US");
        p.is_active = true;
        store.put_participant(&p).unwrap();

        // Enough on both legs for a Bronze promotion after matching
        seed(&store, p.participant_id, Position::Left, 600);
        seed(&store, p.participant_id, Position::Left, 600);
        seed(&store, p.participant_id, Position::Right, 600);

        let run = scheduler.run_once().unwrap();
        assert_eq!(run.matching.matched, 1);
        assert_eq!(run.matching.errors, 0);

        // Matching drained the smaller leg; the rank pass sees the
        // post-match totals, so no promotion this pass
        let loaded = store.participant(p.participant_id).unwrap().unwrap();
        assert_eq!(loaded.rank, Rank::Affiliate);
    }

    #[tokio::test]
    async fn test_adhoc_trigger_runs_a_pass() {
        let (_store, scheduler) = scheduler();
        let run = scheduler.trigger_adhoc("ops").unwrap();
        assert_eq!(run.matching.swept, 0);
        assert_eq!(run.ranks.swept, 0);
    }
}

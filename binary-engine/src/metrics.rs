//! Metrics collection for the compensation engines
//!
//! # Metrics
//!
//! - `binary_placements_total` - Participants linked into the tree
//! - `binary_fanout_lots_total` - Point lots created by fan-outs
//! - `binary_matches_total` - Matching runs that consumed points
//! - `bonds_credited_total` - Bond events with a wallet credit
//! - `bonds_lost_total` - Bond events fully or partially forfeited
//! - `rank_promotions_total` - Max-rank promotions

use prometheus::{IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Participants linked into the tree
    pub placements_total: IntCounter,

    /// Point lots created by fan-outs
    pub fanout_lots_total: IntCounter,

    /// Matching runs that consumed points
    pub matches_total: IntCounter,

    /// Bond events with a wallet credit
    pub bonds_credited_total: IntCounter,

    /// Bond events with a forfeited component
    pub bonds_lost_total: IntCounter,

    /// Max-rank promotions
    pub rank_promotions_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let placements_total = IntCounter::with_opts(Opts::new(
            "binary_placements_total",
            "Participants linked into the tree",
        ))?;
        registry.register(Box::new(placements_total.clone()))?;

        let fanout_lots_total = IntCounter::with_opts(Opts::new(
            "binary_fanout_lots_total",
            "Point lots created by fan-outs",
        ))?;
        registry.register(Box::new(fanout_lots_total.clone()))?;

        let matches_total = IntCounter::with_opts(Opts::new(
            "binary_matches_total",
            "Matching runs that consumed points",
        ))?;
        registry.register(Box::new(matches_total.clone()))?;

        let bonds_credited_total = IntCounter::with_opts(Opts::new(
            "bonds_credited_total",
            "Bond events with a wallet credit",
        ))?;
        registry.register(Box::new(bonds_credited_total.clone()))?;

        let bonds_lost_total = IntCounter::with_opts(Opts::new(
            "bonds_lost_total",
            "Bond events with a forfeited component",
        ))?;
        registry.register(Box::new(bonds_lost_total.clone()))?;

        let rank_promotions_total = IntCounter::with_opts(Opts::new(
            "rank_promotions_total",
            "Max-rank promotions",
        ))?;
        registry.register(Box::new(rank_promotions_total.clone()))?;

        Ok(Self {
            placements_total,
            fanout_lots_total,
            matches_total,
            bonds_credited_total,
            bonds_lost_total,
            rank_promotions_total,
            registry,
        })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

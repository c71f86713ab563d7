//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `wallet_credits_total` - Total credit mutations applied
//! - `wallet_debits_total` - Total debit mutations applied
//! - `wallet_duplicate_ops_total` - Replays recovered via idempotency keys
//! - `wallet_insufficient_funds_total` - Rejected overdraw attempts

use prometheus::{IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Credits applied
    pub credits_total: IntCounter,

    /// Debits applied
    pub debits_total: IntCounter,

    /// Duplicate operations recovered transparently
    pub duplicate_ops_total: IntCounter,

    /// Overdraw attempts rejected
    pub insufficient_funds_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let credits_total = IntCounter::with_opts(Opts::new(
            "wallet_credits_total",
            "Total credit mutations applied",
        ))?;
        registry.register(Box::new(credits_total.clone()))?;

        let debits_total = IntCounter::with_opts(Opts::new(
            "wallet_debits_total",
            "Total debit mutations applied",
        ))?;
        registry.register(Box::new(debits_total.clone()))?;

        let duplicate_ops_total = IntCounter::with_opts(Opts::new(
            "wallet_duplicate_ops_total",
            "Replays recovered via idempotency keys",
        ))?;
        registry.register(Box::new(duplicate_ops_total.clone()))?;

        let insufficient_funds_total = IntCounter::with_opts(Opts::new(
            "wallet_insufficient_funds_total",
            "Rejected overdraw attempts",
        ))?;
        registry.register(Box::new(insufficient_funds_total.clone()))?;

        Ok(Self {
            credits_total,
            debits_total,
            duplicate_ops_total,
            insufficient_funds_total,
            registry,
        })
    }

    /// Record an applied credit
    pub fn record_credit(&self) {
        self.credits_total.inc();
    }

    /// Record an applied debit
    pub fn record_debit(&self) {
        self.debits_total.inc();
    }

    /// Record a transparently recovered duplicate
    pub fn record_duplicate(&self) {
        self.duplicate_ops_total.inc();
    }

    /// Record a rejected overdraw
    pub fn record_insufficient_funds(&self) {
        self.insufficient_funds_total.inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

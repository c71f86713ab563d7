//! Binary compensation engine
//!
//! Implements the network side of the compensation platform: binary tree
//! placement with spillover, expiring point lots fanned out to binary
//! ancestors, FIFO leg matching, capped bond distribution into the wallet
//! ledger and rank qualification.
//!
//! # Architecture
//!
//! - `types` - Participants, point lots, bond audit entries, ranks
//! - `plan` - Injected compensation plan (percents, thresholds, caps)
//! - `locks` - Shared per-participant write serialization
//! - `store` - `NetworkStore` trait with an in-memory implementation
//! - `storage` - RocksDB-backed `NetworkStore`
//! - `placement` - Spillover placement into the binary tree
//! - `points` - Point lot fan-out and leg totals
//! - `matching` - FIFO leg matching and forfeiture
//! - `bonds` - Cap-aware bond distribution into wallets
//! - `ranks` - Rank evaluation, promotion and achievement bonuses
//! - `metrics` - Prometheus counters

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(unused_qualifications)]

pub mod bonds;
pub mod error;
pub mod locks;
pub mod matching;
pub mod metrics;
pub mod placement;
pub mod plan;
pub mod points;
pub mod ranks;
pub mod storage;
pub mod store;
pub mod types;

pub use bonds::{BondEngine, ResidualOutcome};
pub use error::{Error, Result};
pub use locks::ParticipantLocks;
pub use matching::{MatchOutcome, MatchingEngine, SweepReport};
pub use metrics::Metrics;
pub use placement::{PlacementEngine, PlacementOutcome};
pub use plan::{CompensationPlan, RankTier};
pub use points::PointLedger;
pub use ranks::{RankEngine, RankSweepReport};
pub use storage::RocksNetworkStore;
pub use store::{MemoryNetworkStore, NetworkStore};
pub use types::{
    BondCounters, BondLedgerEntry, BondType, DescendantEntry, MatchObligation, Participant,
    PointLot, Position, Rank, RankEvaluation,
};

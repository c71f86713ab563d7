//! PlayGrid Wallet Core
//!
//! Append-only financial ledger with idempotent credit/debit operations and
//! multi-currency wallet resolution.
//!
//! # Invariants
//!
//! - Prefix sum: a wallet's balance equals the sum of all entry amounts and
//!   the `balance_after` of the latest entry
//! - Idempotency: replaying an operation key yields exactly one ledger entry
//! - Non-negative balances: debits that would overdraw are rejected
//! - Append-only: entries are never modified or deleted

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod service;
pub mod storage;
pub mod store;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use service::{CurrencyResolver, StaticResolver, WalletService};
pub use storage::RocksWalletStore;
pub use store::{MemoryWalletStore, WalletStore};
pub use types::{Currency, EntryKind, LedgerEntry, Wallet};

//! Error types for the wallet ledger

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for wallet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wallet ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Amount must be strictly positive
    #[error("Invalid amount: {0} (must be > 0)")]
    InvalidAmount(Decimal),

    /// Debit would drive the balance negative
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Current balance
        available: Decimal,
        /// Requested debit amount
        requested: Decimal,
    },

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

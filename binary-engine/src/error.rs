//! Error types for the binary compensation engine

use thiserror::Error;
use uuid::Uuid;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Binary engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Participant does not exist
    #[error("Participant not found: {0}")]
    ParticipantNotFound(Uuid),

    /// A tree or sponsor-chain walk hit a dangling reference
    #[error("Corrupt link: participant {participant} references missing {missing}")]
    CorruptLink {
        /// Participant holding the bad pointer
        participant: Uuid,
        /// The referenced ID that does not exist
        missing: Uuid,
    },

    /// Optimistic concurrency conflict (retried by the caller)
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Bounded retries exhausted
    #[error("Retry budget exhausted: {0}")]
    RetryExhausted(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Wallet service error during payout
    #[error("Wallet error: {0}")]
    Wallet(#[from] wallet_core::Error),

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

//! Error types for the event gateway

use thiserror::Error;

/// Gateway error type
#[derive(Error, Debug)]
pub enum Error {
    /// Wallet ledger error
    #[error("Wallet error: {0}")]
    Wallet(#[from] wallet_core::Error),

    /// Network engine error
    #[error("Network error: {0}")]
    Network(#[from] binary_engine::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all
    #[error("{0}")]
    Other(String),
}

/// Gateway result type
pub type Result<T> = std::result::Result<T, Error>;

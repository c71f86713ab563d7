//! PlayGrid Event Gateway
//!
//! The composition root of the compensation platform: translates confirmed
//! platform events into wallet mutations and network effects, resolves
//! wallet currencies from participant profiles and drives the periodic
//! matching and rank sweeps.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod resolver;
pub mod scheduler;

pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use gateway::{DepositOutcome, EventGateway, MembershipOutcome};
pub use resolver::ProfileCurrencyResolver;
pub use scheduler::{SweepConfig, SweepRun, SweepScheduler};

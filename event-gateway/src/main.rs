//! Compensation sweep daemon
//!
//! Opens the persistent stores and runs the scheduled matching and rank
//! sweeps. Event ingestion happens in-process through the `EventGateway`
//! library API; this binary only drives the batch side.

use anyhow::Result;
use binary_engine::{
    BondEngine, CompensationPlan, MatchingEngine, NetworkStore, PointLedger, RankEngine,
    RocksNetworkStore,
};
use event_gateway::{GatewayConfig, ProfileCurrencyResolver, SweepScheduler};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wallet_core::{RocksWalletStore, WalletService};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    info!("Starting PlayGrid sweep daemon");

    let config = GatewayConfig::from_env();
    let default_currency = config.default_currency()?;

    let plan = if config.plan_path.is_empty() {
        Arc::new(CompensationPlan::default())
    } else {
        Arc::new(CompensationPlan::from_file(&config.plan_path)?)
    };

    let wallet_config = wallet_core::Config {
        data_dir: format!("{}/wallet", config.data_dir).into(),
        ..Default::default()
    };
    let wallet_store = Arc::new(RocksWalletStore::open(&wallet_config)?);
    let network: Arc<dyn NetworkStore> = Arc::new(RocksNetworkStore::open(format!(
        "{}/network",
        config.data_dir
    ))?);

    let resolver = Arc::new(ProfileCurrencyResolver::new(
        network.clone(),
        default_currency,
    ));
    let wallets = Arc::new(WalletService::new(wallet_store, resolver));
    let bonds = Arc::new(BondEngine::new(network.clone(), wallets, plan.clone()));

    let matching = Arc::new(MatchingEngine::new(
        network.clone(),
        PointLedger::new(network.clone(), plan.clone()),
        bonds.clone(),
    ));
    let ranks = Arc::new(RankEngine::new(
        network.clone(),
        PointLedger::new(network, plan.clone()),
        bonds,
        plan,
    ));

    let scheduler = Arc::new(SweepScheduler::new(matching, ranks, config.sweep.clone()));
    let handle = tokio::spawn(scheduler.start());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down sweep daemon");
    handle.abort();

    Ok(())
}

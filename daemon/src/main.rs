use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use custos_daemon::{
    chain::{BoundedChain, SimulatedChain},
    config::Config,
    custodian::Custodian,
    scheduler::Scheduler,
    storage::Store,
};

/// Custos custodial backend daemon.
///
/// Configuration comes from the environment (see config module); the
/// command line only selects local runtime concerns.
#[derive(Parser)]
#[clap(version = custos_common::config::VERSION)]
struct NodeArgs {
    /// Directory for the database
    #[clap(long, default_value_t = String::from("custos-db"))]
    data_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = NodeArgs::parse();

    let config = Arc::new(Config::from_env().context("loading configuration")?);
    info!(
        "custos daemon {} starting on {} ({} multisig members configured)",
        custos_common::config::VERSION,
        config.network,
        config.member_keys.len()
    );

    let store = Arc::new(Store::open(&args.data_dir).context("opening storage")?);
    // Deployments embed the daemon as a library and wire their RPC-backed
    // chain client; the standalone binary runs against the simulated chain
    let chain = Arc::new(BoundedChain::new(SimulatedChain::new()));
    let custodian = Arc::new(Custodian::new(store, chain, config.clone()));
    let scheduler = Scheduler::new(custodian);

    if config.auto_start_monitoring {
        scheduler.start_all().await.context("starting monitoring")?;
        info!("blockchain monitoring auto-started");
    }

    tokio::signal::ctrl_c().await.context("waiting for shutdown")?;
    info!("shutdown requested, stopping jobs");
    scheduler.stop_all().await;
    Ok(())
}

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

use roverlink_server::{
    config::{ManagerConfig, StoreConfig},
    endpoint::HttpRoverClient,
    store::create_store,
    web::Web,
    Cli, RoverManager, VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(args.verbose.log_level_filter())
        .format_timestamp_millis()
        .init();

    log::info!("Roverlink server {} for owner '{}'", VERSION, args.owner);

    let store_config = StoreConfig::from_cli(&args).into_diagnostic()?;
    log::debug!("Store: {:?}", store_config);
    let store = create_store(&store_config).into_diagnostic()?;

    let manager = RoverManager::new(
        store,
        Arc::new(HttpRoverClient::new()),
        ManagerConfig::from(&args),
    );
    match manager.refresh_saved().await {
        Ok(saved) => log::info!("{} saved rovers available", saved.len()),
        Err(e) => log::warn!("Could not load saved rovers: {}", e),
    }

    let web = Web::new(manager.clone(), args.port);

    Toplevel::new(move |s| async move {
        s.start(SubsystemBuilder::new("webserver", |a| web.run(a)));
        s.start(SubsystemBuilder::new("manager", |a| run_manager(manager, a)));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(5))
    .await
    .map_err(Into::into)
}

/// Keeps the manager alive until shutdown, then flushes pending saves
async fn run_manager(manager: RoverManager, subsys: SubsystemHandle) -> Result<(), Infallible> {
    subsys.on_shutdown_requested().await;
    manager.shutdown().await;
    Ok(())
}

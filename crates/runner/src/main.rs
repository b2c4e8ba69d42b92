use auth::ApiCredentials;
use manager::{run_scheduler, Core};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    common::init_logging();

    let datapath = std::env::var("TRADER_DATAPATH").unwrap_or_else(|_| "data".into());

    let credentials = match ApiCredentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            error!(error = %e, "missing API credentials");
            std::process::exit(1);
        }
    };

    let core = match Core::new(&datapath, credentials) {
        Ok(core) => Arc::new(core),
        Err(e) => {
            error!(error = %e, "failed to assemble core");
            std::process::exit(1);
        }
    };

    info!(datapath = %datapath, "starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Market and user-data streams.
    let stream_handles = core.spawn_streams(shutdown_rx.clone());

    // The cron-second scheduler drives every periodic job.
    let scheduler_handle = tokio::spawn(run_scheduler(core.clone(), shutdown_rx));

    // Ctrl+C initiates shutdown.
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl+c, shutting down");
            let _ = shutdown_tx_clone.send(true);
        }
    });

    let _ = scheduler_handle.await;
    for handle in stream_handles {
        let _ = handle.await;
    }

    info!("shutdown complete");
}

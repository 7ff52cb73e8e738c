//! # Client Entry Point
//!
//! Wires the persistent store, the pipeline services, and the adapters
//! together, then hands the process over to the background scheduler until
//! Ctrl+C.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use en_pipeline::PipelineConfig;
use en_runtime::adapters::{DirDistributionClient, LogNotifier, StubEngine};
use en_runtime::{build_controller, Collaborators, RuntimeConfig, Scheduler};
use en_storage::{BlobStore, FileBackedKvStore, StateStore, StdFileSystem};
use shared_types::time::{Clock, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = RuntimeConfig::from_env();

    info!("==========================================");
    info!("  Exposure Notification Client");
    info!("  Version: {}", env!("CARGO_PKG_VERSION"));
    info!("==========================================");
    info!(
        store = %config.store_path.display(),
        blobs = %config.blob_dir.display(),
        distribution = %config.distribution_dir.display(),
        regime = ?config.quota_regime,
        "configuration loaded"
    );

    let store = StateStore::new(FileBackedKvStore::open(&config.store_path)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let client = Arc::new(DirDistributionClient::new(
        &config.distribution_dir,
        &config.staging_dir,
        Arc::clone(&clock),
    ));

    let controller = build_controller(Collaborators {
        store,
        blobs: BlobStore::new(&config.blob_dir, Arc::new(StdFileSystem)),
        client,
        engine: Arc::new(StubEngine),
        notifier: Arc::new(LogNotifier),
        clock,
        quota_regime: config.quota_regime,
        config: PipelineConfig::default(),
    });

    controller.initialize().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(Arc::clone(&controller), config.check_interval, shutdown_rx);
    let scheduler_task = tokio::spawn(scheduler.run());

    info!("client running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    shutdown_tx.send(true)?;
    scheduler_task.await?;
    info!("client stopped");
    Ok(())
}

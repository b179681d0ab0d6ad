//! Supervisor
//!
//! Owns the daemon lifecycle: builds the bus and registries, subscribes the
//! consumers before any producer starts, spawns every task, and drives the
//! cooperative shutdown. Periodic tasks (discoverer and the two reloaders)
//! hold stop channels checked between ticks; the consumer chain exits when
//! the bus closes and its channels drain. A running external pipeline is
//! never aborted; shutdown completes when it returns.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use log::{error, info};
use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::bus::{MessageBus, Topic};
use crate::config::{self, AppConfig, SharedConfig};
use crate::dispatch::{self, WorkflowRunner};
use crate::logging;
use crate::registry::{self, ExclusionRegistry, ProgressRegistry};
use crate::watch;

/// Run the daemon until SIGINT.
pub async fn run(
    initial_config: AppConfig,
    config_path: PathBuf,
    runner: Arc<dyn WorkflowRunner>,
) -> std::io::Result<()> {
    info!("🚀 Starting autoseq daemon");

    let cfg = initial_config.clone();
    let config: SharedConfig = Arc::new(RwLock::new(initial_config));
    let bus = Arc::new(MessageBus::new());
    let exclusions = Arc::new(ExclusionRegistry::new());
    let progress = Arc::new(ProgressRegistry::new());

    // First exclusion load happens before the scanner can observe anything.
    exclusions.reload(&cfg.run_exclude_files, &cfg.library_exclude_files);

    // Subscriptions precede producer start so no event is dropped.
    let symlinking_consumer = bus.subscribe(Topic::Symlinking).await;
    let analysis_consumer = bus.subscribe(Topic::Analysis).await;
    let logging_consumer = bus.subscribe(Topic::Logging).await;

    let (batch_tx, batch_rx) = mpsc::channel(1);
    let (discoverer_stop_tx, discoverer_stop_rx) = mpsc::channel(1);
    let (config_stop_tx, config_stop_rx) = mpsc::channel(1);
    let (exclusion_stop_tx, exclusion_stop_rx) = mpsc::channel(1);

    let config_reloader = tokio::spawn(config::run_config_reloader(
        config_path,
        Arc::clone(&config),
        config_stop_rx,
    ));
    let exclusion_reloader = tokio::spawn(registry::run_exclusion_reloader(
        Arc::clone(&exclusions),
        Arc::clone(&config),
        exclusion_stop_rx,
    ));
    let discoverer = tokio::spawn(watch::run_discoverer(
        Arc::clone(&bus),
        Arc::clone(&config),
        Arc::clone(&exclusions),
        Arc::clone(&progress),
        discoverer_stop_rx,
    ));
    let materializer = tokio::spawn(watch::run_materializer(
        Arc::clone(&bus),
        symlinking_consumer,
        Arc::clone(&config),
        Arc::clone(&exclusions),
        Arc::clone(&progress),
    ));
    let batcher = tokio::spawn(dispatch::run_batcher(
        analysis_consumer,
        cfg.analysis_batch_max_size,
        Duration::from_millis(cfg.analysis_batch_timeout_ms),
        batch_tx,
    ));
    let dispatcher = tokio::spawn(dispatch::run_dispatcher(
        Arc::clone(&bus),
        Arc::clone(&config),
        runner,
        batch_rx,
    ));
    let log_consumer = tokio::spawn(logging::run_log_consumer(logging_consumer));

    tokio::signal::ctrl_c().await?;
    info!("🛑 Stop signal received, shutting down");

    // Periodic tasks first: each exits on its next tick.
    let _ = discoverer_stop_tx.send(()).await;
    let _ = config_stop_tx.send(()).await;
    let _ = exclusion_stop_tx.send(()).await;
    for (name, handle) in [
        ("discoverer", discoverer),
        ("config reloader", config_reloader),
        ("exclusion reloader", exclusion_reloader),
    ] {
        if let Err(e) = handle.await {
            error!("{} task failed: {}", name, e);
        }
    }

    // Closing the bus drains the consumer chain: the materializer sees its
    // channel end, the batcher flushes its partial batch and closes the
    // batch channel, the dispatcher finishes in-flight work and exits.
    bus.close().await;
    for (name, handle) in [
        ("materializer", materializer),
        ("batcher", batcher),
        ("dispatcher", dispatcher),
        ("logging consumer", log_consumer),
    ] {
        if let Err(e) = handle.await {
            error!("{} task failed: {}", name, e);
        }
    }

    info!("autoseq daemon stopped");
    Ok(())
}

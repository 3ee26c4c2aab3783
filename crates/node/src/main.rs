//! TaskBridge Node - Main Entry Point
//!
//! Resolves configuration, attaches the inference backend, serves the task
//! endpoint, and reports liveness to the registry until shutdown.

use clap::Parser;
use std::sync::Arc;
use taskbridge_node::cli::log_filter;
use taskbridge_node::{Args, EchoBackend, InferenceBackend, ServiceFront, Shard, TaskBridge};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = args.load_config()?;
    config.apply_env()?;
    config.validate()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter(config.debug_level()).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting TaskBridge node");

    let identity = config.identity()?;
    let addr = config.listen_addr()?;

    // Attach the backend
    let shard = config.model.as_ref().map(Shard::from);
    match &shard {
        Some(shard) => info!(
            "Serving model {} layers {}-{} of {}",
            shard.model_id, shard.start_layer, shard.end_layer, shard.n_layers
        ),
        None => warn!("No model configured, task requests will be rejected"),
    }
    let backend: Arc<dyn InferenceBackend> = Arc::new(EchoBackend::new(shard));

    let bridge = TaskBridge::new(Some(backend)).with_timeout(config.task_timeout());
    let front = Arc::new(ServiceFront::new(bridge, identity, config.registry.clone()));

    let cancel = CancellationToken::new();
    let mut server = tokio::spawn(front.run(addr, cancel.clone()));

    // Wait for shutdown signal
    let interrupted = tokio::select! {
        _ = signal::ctrl_c() => true,
        result = &mut server => {
            result??;
            false
        }
    };

    if interrupted {
        info!("Received shutdown signal");
        cancel.cancel();
        server.await??;
    }

    info!("TaskBridge node shutdown complete");
    Ok(())
}

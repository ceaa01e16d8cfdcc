use std::sync::Arc;

use edge_dispatch::{
    config::EngineConfig,
    dispatcher::Dispatcher,
    models::job::JobType,
    services::{
        monitor::SystemProbe,
        registry::{HandlerRegistry, NoopHandler},
    },
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting edge dispatch worker");

    // Load configuration
    let config = EngineConfig::from_env().expect("Failed to load configuration");

    // Real deployments register inference backends here; the noop handler
    // only demonstrates the wiring.
    let registry = HandlerRegistry::new()
        .with_handler(JobType::ImageLabeling, Arc::new(NoopHandler))
        .with_handler(JobType::TextRecognition, Arc::new(NoopHandler))
        .with_handler(JobType::ObjectDetection, Arc::new(NoopHandler))
        .with_handler(JobType::SpeechRecognition, Arc::new(NoopHandler));

    let dispatcher = Dispatcher::new(config, registry, Arc::new(SystemProbe::new()))
        .expect("Failed to initialize dispatcher");

    tracing::info!(device_id = %dispatcher.device_id(), "Worker ready, starting dispatch loop");
    dispatcher.start().await;

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");

    tracing::info!("Shutdown signal received");
    dispatcher.stop();

    let status = dispatcher.status();
    tracing::info!(
        completed = status.completed_jobs,
        failed = status.failed_jobs,
        uptime_ms = status.uptime_ms,
        "Worker exiting"
    );
}

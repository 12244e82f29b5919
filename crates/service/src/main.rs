//! HMPI service - water quality analysis API
//!
//! Serves single-sample analysis, batch jobs and sample history over HTTP.

use anyhow::Result;
use hmpi_lib::{
    classifier::{Classifier, OnnxClassifier},
    health::{Component, HealthRegistry},
    observability::{PipelineMetrics, StructuredLogger},
    store::MemorySampleStore,
};
use hmpi_service::{api, build_orchestrator, ServiceConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting hmpi-service");

    let config = ServiceConfig::load()?;
    info!(
        instance = %config.instance_name,
        chunk_size = config.chunk_size,
        max_workers = config.max_workers,
        "Service configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let classifier = Arc::new(match &config.model_path {
        Some(path) => match OnnxClassifier::from_file(path, config.labels()) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Failed to load model, using fallback");
                OnnxClassifier::new_without_model()
            }
        },
        None => OnnxClassifier::new_without_model(),
    });
    if !classifier.is_trained() {
        health_registry
            .set_degraded(Component::Classifier, "No model loaded, using fallback distribution")
            .await;
    }

    let metrics = PipelineMetrics::new();
    metrics.set_model_version(classifier.model_version());

    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(SERVICE_VERSION, classifier.model_version());

    let orchestrator = build_orchestrator(
        &config,
        classifier.clone(),
        Arc::new(MemorySampleStore::new()),
    );
    let reaper = orchestrator.registry().spawn_reaper(config.reaper_config());

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        orchestrator,
        config.sync_batch_limit,
    ));

    health_registry.set_ready(true).await;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
    };
    api::serve(config.api_port, app_state, shutdown).await?;

    health_registry.set_ready(false).await;
    reaper.shutdown().await;
    let stats = classifier.stats();
    logger.log_inference_stats(
        classifier.model_version(),
        stats.total_inferences,
        stats.slow_inferences,
    );
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    Ok(())
}

//! HTTP service for heavy-metal water quality analysis
//!
//! A thin axum transport over `hmpi_lib`, plus configuration loading and
//! wiring of the shared pipeline components.

pub mod api;
pub mod config;

pub use api::{create_router, AppState};
pub use config::ServiceConfig;

use hmpi_lib::{
    batch::{BatchOrchestrator, JobRegistry},
    classifier::Classifier,
    observability::StructuredLogger,
    processor::SampleProcessor,
    store::SampleStore,
};
use std::sync::Arc;

/// Wire the processor, job registry and orchestrator from configuration
pub fn build_orchestrator(
    config: &ServiceConfig,
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn SampleStore>,
) -> Arc<BatchOrchestrator> {
    let logger = StructuredLogger::new(&config.instance_name);
    let processor = SampleProcessor::new(classifier, store).with_logger(logger.clone());
    let registry = JobRegistry::new(config.job_retention()).with_logger(logger);
    Arc::new(BatchOrchestrator::new(
        Arc::new(processor),
        registry,
        config.batch_config(),
    ))
}

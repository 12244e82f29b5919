//! Core library for heavy-metal water quality assessment
//!
//! This crate provides the core functionality for:
//! - Unit detection and normalization of metal concentrations
//! - Pollution index computation (CF, PLI, HMPI) and severity bands
//! - Per-sample processing with classification and persistence
//! - Chunked batch processing with a bounded worker pool
//! - Job tracking with retention-based eviction
//! - Health checks and observability

pub mod batch;
pub mod classifier;
pub mod error;
pub mod health;
pub mod indices;
pub mod models;
pub mod observability;
pub mod processor;
pub mod store;

pub use batch::{BatchConfig, BatchOrchestrator, JobId, JobRegistry, JobStatus, JobStatusView};
pub use classifier::{Classifier, FallbackClassifier, OnnxClassifier, Prediction};
pub use error::{HmpiError, Result, SkipReason};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PipelineMetrics, StructuredLogger};
pub use processor::{ProcessedRow, SampleAnalysis, SampleProcessor};
pub use store::{MemorySampleStore, SampleStore};

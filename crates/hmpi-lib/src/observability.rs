//! Observability infrastructure for the analysis pipeline
//!
//! Provides:
//! - Prometheus metrics (per-sample latency, row outcomes, job lifecycle, model version)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for single-sample processing (in seconds)
const SAMPLE_LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5,
];

/// Histogram buckets for whole-job duration (in seconds)
const JOB_DURATION_BUCKETS: &[f64] = &[0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    sample_processing_seconds: Histogram,
    job_duration_seconds: Histogram,
    rows_processed: IntCounter,
    rows_skipped: IntCounterVec,
    jobs_submitted: IntCounter,
    jobs_completed: IntCounter,
    jobs_failed: IntCounter,
    jobs_reaped: IntCounter,
    jobs_active: IntGauge,
    classifier_fallbacks: IntCounter,
    model_info: GaugeVec,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            sample_processing_seconds: register_histogram!(
                "hmpi_sample_processing_seconds",
                "Time spent turning one row into an enriched result",
                SAMPLE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register sample_processing_seconds"),

            job_duration_seconds: register_histogram!(
                "hmpi_job_duration_seconds",
                "Wall time from job submission to a terminal state",
                JOB_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register job_duration_seconds"),

            rows_processed: register_int_counter!(
                "hmpi_rows_processed_total",
                "Total number of rows that produced a stored result"
            )
            .expect("Failed to register rows_processed"),

            rows_skipped: register_int_counter_vec!(
                "hmpi_rows_skipped_total",
                "Total number of rows skipped, by reason",
                &["reason"]
            )
            .expect("Failed to register rows_skipped"),

            jobs_submitted: register_int_counter!(
                "hmpi_jobs_submitted_total",
                "Total number of batch jobs submitted"
            )
            .expect("Failed to register jobs_submitted"),

            jobs_completed: register_int_counter!(
                "hmpi_jobs_completed_total",
                "Total number of batch jobs completed"
            )
            .expect("Failed to register jobs_completed"),

            jobs_failed: register_int_counter!(
                "hmpi_jobs_failed_total",
                "Total number of batch jobs failed by an orchestration fault"
            )
            .expect("Failed to register jobs_failed"),

            jobs_reaped: register_int_counter!(
                "hmpi_jobs_reaped_total",
                "Total number of finished jobs evicted after retention"
            )
            .expect("Failed to register jobs_reaped"),

            jobs_active: register_int_gauge!(
                "hmpi_jobs_active",
                "Number of jobs currently processing"
            )
            .expect("Failed to register jobs_active"),

            classifier_fallbacks: register_int_counter!(
                "hmpi_classifier_fallbacks_total",
                "Total number of predictions replaced by the fallback distribution"
            )
            .expect("Failed to register classifier_fallbacks"),

            model_info: register_gauge_vec!(
                "hmpi_model_info",
                "Information about the currently loaded classifier model",
                &["version"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance. Clones share the
/// same underlying series.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn observe_sample_processing(&self, duration_secs: f64) {
        self.inner().sample_processing_seconds.observe(duration_secs);
    }

    pub fn observe_job_duration(&self, duration_secs: f64) {
        self.inner().job_duration_seconds.observe(duration_secs);
    }

    pub fn inc_rows_processed(&self) {
        self.inner().rows_processed.inc();
    }

    pub fn inc_rows_skipped(&self, reason: &str) {
        self.inner().rows_skipped.with_label_values(&[reason]).inc();
    }

    /// Count a submission and mark the job active
    pub fn job_submitted(&self) {
        self.inner().jobs_submitted.inc();
        self.inner().jobs_active.inc();
    }

    pub fn job_completed(&self) {
        self.inner().jobs_completed.inc();
        self.inner().jobs_active.dec();
    }

    pub fn job_failed(&self) {
        self.inner().jobs_failed.inc();
        self.inner().jobs_active.dec();
    }

    pub fn inc_jobs_reaped(&self, count: u64) {
        self.inner().jobs_reaped.inc_by(count);
    }

    pub fn inc_classifier_fallbacks(&self) {
        self.inner().classifier_fallbacks.inc();
    }

    /// Update model version info
    pub fn set_model_version(&self, version: &str) {
        self.inner().model_info.reset();
        self.inner().model_info.with_label_values(&[version]).set(1.0);
    }
}

/// Structured logger for pipeline events
///
/// Every event carries a stable `event` field and the instance name so log
/// pipelines can filter on them.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, model_version: &str) {
        info!(
            event = "service_started",
            instance = %self.instance,
            service_version = %version,
            model_version = %model_version,
            "HMPI service started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "HMPI service shutting down"
        );
    }

    pub fn log_job_submitted(&self, job_id: &str, total_rows: usize, chunks: usize) {
        info!(
            event = "job_submitted",
            instance = %self.instance,
            job_id = %job_id,
            total_rows = total_rows,
            chunks = chunks,
            "Batch job submitted"
        );
    }

    pub fn log_job_completed(&self, job_id: &str, results: usize, skipped: usize, elapsed_secs: f64) {
        info!(
            event = "job_completed",
            instance = %self.instance,
            job_id = %job_id,
            results = results,
            skipped = skipped,
            elapsed_secs = elapsed_secs,
            "Batch job completed"
        );
    }

    pub fn log_job_failed(&self, job_id: &str, error: &str) {
        warn!(
            event = "job_failed",
            instance = %self.instance,
            job_id = %job_id,
            error = %error,
            "Batch job failed"
        );
    }

    /// Log a row that produced no result
    pub fn log_row_skipped(&self, job_id: Option<&str>, row_id: usize, reason: &str, details: &str) {
        match reason {
            "persistence" => warn!(
                event = "row_skipped",
                instance = %self.instance,
                job_id = ?job_id,
                row_id = row_id,
                reason = %reason,
                details = %details,
                "Row skipped after store failure"
            ),
            _ => info!(
                event = "row_skipped",
                instance = %self.instance,
                job_id = ?job_id,
                row_id = row_id,
                reason = %reason,
                "Row skipped"
            ),
        }
    }

    /// Per-row success; debug level since batches run to thousands of rows
    pub fn log_row_processed(
        &self,
        job_id: Option<&str>,
        row_id: usize,
        sample_id: &str,
        hmpi: f64,
        band: &str,
    ) {
        debug!(
            event = "row_processed",
            instance = %self.instance,
            job_id = ?job_id,
            row_id = row_id,
            sample_id = %sample_id,
            hmpi = hmpi,
            band = %band,
            "Row processed"
        );
    }

    pub fn log_jobs_reaped(&self, count: usize, remaining: usize) {
        info!(
            event = "jobs_reaped",
            instance = %self.instance,
            count = count,
            remaining = remaining,
            "Evicted expired jobs"
        );
    }

    pub fn log_sample_analyzed(&self, sample_id: &str, hmpi: f64, band: &str, prediction: &str) {
        info!(
            event = "sample_analyzed",
            instance = %self.instance,
            sample_id = %sample_id,
            hmpi = hmpi,
            band = %band,
            prediction = %prediction,
            "Sample analyzed"
        );
    }

    pub fn log_inference_stats(&self, model_version: &str, total: u64, slow: u64) {
        info!(
            event = "inference_stats",
            instance = %self.instance,
            model_version = %model_version,
            total_inferences = total,
            slow_inferences = slow,
            "Classifier inference totals"
        );
    }

    pub fn log_classifier_fallback(&self, model_version: &str, error: &str) {
        warn!(
            event = "classifier_fallback",
            instance = %self.instance,
            model_version = %model_version,
            error = %error,
            "Classifier unavailable, using fallback distribution"
        );
    }
}

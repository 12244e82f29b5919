//! Process-wide job table with retention-based eviction

use super::{Job, JobId, JobStatus, JobStatusView};
use crate::error::{HmpiError, Result, SkipReason};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::processor::ProcessedRow;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// How long a finished job stays queryable
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Reaper schedule
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Owns every job for its full lifetime
///
/// Clones share the same table. Each mutation goes through a single map
/// entry guard, so concurrent workers never lose an update.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<DashMap<JobId, Job>>,
    retention: chrono::Duration,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl JobRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            retention: chrono::Duration::from_std(retention)
                .unwrap_or_else(|_| chrono::Duration::hours(1)),
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new("hmpi"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Register a new processing job; it is visible as soon as this returns
    pub fn create(&self, total: usize) -> JobId {
        let job = Job::new(total);
        let id = job.id;
        self.jobs.insert(id, job);
        self.metrics.job_submitted();
        id
    }

    /// Count one finished row, processed or skipped
    pub fn record_row_outcome(
        &self,
        id: &JobId,
        outcome: &std::result::Result<ProcessedRow, SkipReason>,
    ) {
        let Some(mut job) = self.jobs.get_mut(id) else {
            debug!(job_id = %id, "Row outcome for unknown job ignored");
            return;
        };
        if job.status.is_terminal() {
            return;
        }
        if let Err(reason) = outcome {
            *job.skipped.entry(reason.label().to_string()).or_insert(0) += 1;
        }
        job.processed = (job.processed + 1).min(job.total);
        job.recompute_progress();
    }

    /// Attach the results and mark the job completed
    ///
    /// `processed` is left as the row outcomes recorded it.
    pub fn complete(&self, id: &JobId, results: Vec<ProcessedRow>) {
        let Some(mut job) = self.jobs.get_mut(id) else {
            return;
        };
        if job.status.is_terminal() {
            return;
        }
        if job.processed != job.total {
            warn!(
                job_id = %id,
                processed = job.processed,
                total = job.total,
                "Completing job with unrecorded rows"
            );
        }
        let now = Utc::now();
        job.status = JobStatus::Completed;
        job.recompute_progress();
        job.results = results;
        job.completed_at = Some(now);

        let elapsed = (now - job.created_at).num_milliseconds() as f64 / 1000.0;
        self.metrics.job_completed();
        self.metrics.observe_job_duration(elapsed);
        self.logger.log_job_completed(
            &id.to_string(),
            job.results.len(),
            job.skipped_total(),
            elapsed,
        );
    }

    /// Mark the job failed; no partial results are kept
    pub fn fail(&self, id: &JobId, error: impl Into<String>) {
        let Some(mut job) = self.jobs.get_mut(id) else {
            return;
        };
        if job.status.is_terminal() {
            return;
        }
        let now = Utc::now();
        job.status = JobStatus::Failed;
        job.results.clear();
        job.error = Some(error.into());
        job.completed_at = Some(now);

        self.metrics.job_failed();
        self.metrics
            .observe_job_duration((now - job.created_at).num_milliseconds() as f64 / 1000.0);
        self.logger
            .log_job_failed(&id.to_string(), job.error.as_deref().unwrap_or_default());
    }

    pub fn get(&self, id: &JobId) -> Result<Job> {
        self.jobs
            .get(id)
            .map(|job| job.clone())
            .ok_or_else(|| HmpiError::JobNotFound(id.to_string()))
    }

    /// Status view for a job id given as text
    pub fn status(&self, id: &str) -> Result<JobStatusView> {
        let id: JobId = id.parse()?;
        self.jobs
            .get(&id)
            .map(|job| JobStatusView::from(job.value()))
            .ok_or_else(|| HmpiError::JobNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Evict terminal jobs finished longer than the retention window before `now`
    pub fn reap_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let before = self.jobs.len();
        self.jobs.retain(|_, job| {
            !(job.status.is_terminal() && job.completed_at.is_some_and(|t| t < cutoff))
        });
        let reaped = before.saturating_sub(self.jobs.len());

        if reaped > 0 {
            self.metrics.inc_jobs_reaped(reaped as u64);
            self.logger.log_jobs_reaped(reaped, self.jobs.len());
        }
        reaped
    }

    /// Start the periodic reaper; stop it through the returned handle
    pub fn spawn_reaper(&self, config: ReaperConfig) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let registry = self.clone();

        let task = tokio::spawn(async move {
            info!(interval_secs = config.interval.as_secs(), "Starting job reaper");
            let mut ticker = interval(config.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        registry.reap_expired(Utc::now());
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Shutting down job reaper");
                        break;
                    }
                }
            }
        });

        ReaperHandle { shutdown_tx, task }
    }
}

/// Handle to a running reaper task
pub struct ReaperHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stop the reaper and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_immediately_visible() {
        let registry = JobRegistry::default();
        let id = registry.create(10);

        let view = registry.status(&id.to_string()).unwrap();
        assert_eq!(view.status, JobStatus::Processing);
        assert_eq!(view.processed, 0);
        assert_eq!(view.total, 10);
        assert_eq!(view.progress, 0.0);
    }

    #[test]
    fn test_unknown_job_is_not_found() {
        let registry = JobRegistry::default();
        assert!(registry.status(&JobId::new().to_string()).unwrap_err().is_not_found());
        assert!(registry.status("garbage").unwrap_err().is_not_found());
    }

    #[test]
    fn test_skip_accounting_and_progress() {
        let registry = JobRegistry::default();
        let id = registry.create(4);

        registry.record_row_outcome(&id, &Err(SkipReason::EmptySample));
        registry.record_row_outcome(&id, &Err(SkipReason::Persistence("down".into())));
        registry.record_row_outcome(&id, &Err(SkipReason::EmptySample));

        let job = registry.get(&id).unwrap();
        assert_eq!(job.processed, 3);
        assert_eq!(job.progress, 75.0);
        assert_eq!(job.skipped["empty_sample"], 2);
        assert_eq!(job.skipped["persistence"], 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_row_outcomes_are_all_counted() {
        let registry = JobRegistry::default();
        let id = registry.create(400);

        let mut handles = Vec::new();
        for worker in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                for row in 0..50 {
                    let outcome: std::result::Result<ProcessedRow, SkipReason> = if row % 5 == 0 {
                        Err(SkipReason::EmptySample)
                    } else {
                        Err(SkipReason::Persistence(format!("worker {} down", worker)))
                    };
                    registry.record_row_outcome(&id, &outcome);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.processed, 400);
        assert_eq!(job.progress, 100.0);
        assert_eq!(job.skipped["empty_sample"], 80);
        assert_eq!(job.skipped["persistence"], 320);
        assert_eq!(job.skipped_total(), 400);
    }

    #[test]
    fn test_complete_keeps_recorded_count() {
        let registry = JobRegistry::default();
        let id = registry.create(10);
        for _ in 0..4 {
            registry.record_row_outcome(&id, &Err(SkipReason::EmptySample));
        }

        registry.complete(&id, vec![]);

        let view = registry.status(&id.to_string()).unwrap();
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.processed, 4);
        assert_eq!(view.progress, 40.0);
    }

    #[test]
    fn test_complete_then_fail_is_ignored() {
        let registry = JobRegistry::default();
        let id = registry.create(0);

        registry.complete(&id, vec![]);
        registry.fail(&id, "late failure");

        let view = registry.status(&id.to_string()).unwrap();
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.progress, 100.0);
        assert!(view.error.is_none());
    }

    #[test]
    fn test_fail_records_error() {
        let registry = JobRegistry::default();
        let id = registry.create(3);
        registry.fail(&id, "chunk task panicked");

        let view = registry.status(&id.to_string()).unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.error.as_deref(), Some("chunk task panicked"));
        assert!(view.results.is_none());
    }

    #[test]
    fn test_reaper_evicts_only_expired_terminal_jobs() {
        let registry = JobRegistry::new(Duration::from_secs(3600));
        let done = registry.create(0);
        let running = registry.create(5);
        registry.complete(&done, vec![]);

        let now = Utc::now();
        assert_eq!(registry.reap_expired(now), 0);
        assert!(registry.get(&done).is_ok());

        let later = now + chrono::Duration::hours(2);
        assert_eq!(registry.reap_expired(later), 1);
        assert!(registry.status(&done.to_string()).unwrap_err().is_not_found());
        assert!(registry.get(&running).is_ok());
    }

    #[tokio::test]
    async fn test_spawned_reaper_evicts_and_shuts_down() {
        let registry = JobRegistry::new(Duration::ZERO);
        let id = registry.create(0);
        registry.complete(&id, vec![]);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let handle = registry.spawn_reaper(ReaperConfig {
            interval: Duration::from_millis(10),
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(registry.get(&id).is_err());
        handle.shutdown().await;
    }
}

//! Batch processing
//!
//! A batch is split into fixed-size chunks that run on a worker pool shared
//! by every job in the process. Job state lives in a [`JobRegistry`]; callers
//! hold only the [`JobId`] and poll it.

mod orchestrator;
mod registry;

pub use orchestrator::{BatchConfig, BatchOrchestrator, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_WORKERS};
pub use registry::{JobRegistry, ReaperConfig, ReaperHandle, DEFAULT_RETENTION};

use crate::error::HmpiError;
use crate::processor::ProcessedRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque, globally unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = HmpiError;

    /// A malformed id cannot name a job, so it is reported as not found
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| HmpiError::JobNotFound(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one batch submission
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub total: usize,
    /// Rows finished so far, processed or skipped; never decreases
    pub processed: usize,
    pub progress: f64,
    /// Attached only on completion
    pub results: Vec<ProcessedRow>,
    /// Skip counts keyed by reason label
    pub skipped: BTreeMap<String, usize>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Job {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Processing,
            total,
            processed: 0,
            progress: 0.0,
            results: Vec::new(),
            skipped: BTreeMap::new(),
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    pub(crate) fn recompute_progress(&mut self) {
        self.progress = if self.total == 0 {
            100.0
        } else {
            self.processed as f64 / self.total as f64 * 100.0
        };
    }
}

/// What a caller sees when polling a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    pub processed: usize,
    pub total: usize,
    #[serde(default)]
    pub skipped: BTreeMap<String, usize>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ProcessedRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: (job.progress * 100.0).round() / 100.0,
            processed: job.processed,
            total: job.total,
            skipped: job.skipped.clone(),
            created_at: job.created_at,
            completed_at: job.completed_at,
            results: (job.status == JobStatus::Completed).then(|| job.results.clone()),
            error: if job.status == JobStatus::Failed {
                Some(job.error.clone().unwrap_or_else(|| "Unknown error".to_string()))
            } else {
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!(matches!(
            "not-a-uuid".parse::<JobId>(),
            Err(HmpiError::JobNotFound(_))
        ));
    }

    #[test]
    fn test_view_hides_results_until_completed() {
        let mut job = Job::new(4);
        job.processed = 1;
        job.recompute_progress();

        let view = JobStatusView::from(&job);
        assert_eq!(view.progress, 25.0);
        assert!(view.results.is_none());
        assert!(view.error.is_none());

        job.status = JobStatus::Failed;
        job.error = Some("worker pool closed".into());
        let view = JobStatusView::from(&job);
        assert!(view.results.is_none());
        assert_eq!(view.error.as_deref(), Some("worker pool closed"));

        job.status = JobStatus::Completed;
        job.error = None;
        assert_eq!(JobStatusView::from(&job).results, Some(vec![]));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }
}

//! Chunked batch execution on a bounded worker pool

use super::{JobId, JobRegistry};
use crate::error::{HmpiError, SkipReason};
use crate::models::{Metal, Row, RowSource};
use crate::processor::{ProcessedRow, SampleProcessor};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Configuration for batch execution
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Rows per chunk
    pub chunk_size: usize,
    /// Chunks processed at once, across all jobs
    pub max_workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

/// Split rows into contiguous chunks of at most `chunk_size`
pub fn split_into_chunks(rows: Vec<Row>, chunk_size: usize) -> Vec<Vec<Row>> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(rows.len().div_ceil(chunk_size));
    let mut iter = rows.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(chunk_size).collect());
    }
    chunks
}

/// Runs batches through the sample processor and tracks them as jobs
pub struct BatchOrchestrator {
    processor: Arc<SampleProcessor>,
    registry: JobRegistry,
    workers: Arc<Semaphore>,
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(processor: Arc<SampleProcessor>, registry: JobRegistry, config: BatchConfig) -> Self {
        let config = BatchConfig {
            chunk_size: config.chunk_size.max(1),
            max_workers: config.max_workers.max(1),
        };
        Self {
            processor,
            registry,
            workers: Arc::new(Semaphore::new(config.max_workers)),
            config,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn processor(&self) -> &Arc<SampleProcessor> {
        &self.processor
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Register a job and start it in the background
    ///
    /// The job is queryable before this returns. Must be called from within
    /// a tokio runtime.
    pub fn submit(&self, source: RowSource) -> JobId {
        let total = source.len();
        let id = self.registry.create(total);
        let (rows, metals) = source.into_parts();
        let chunks = split_into_chunks(rows, self.config.chunk_size);

        self.processor
            .logger()
            .log_job_submitted(&id.to_string(), total, chunks.len());

        if chunks.is_empty() {
            self.registry.complete(&id, Vec::new());
            return id;
        }

        let run = JobRun {
            id,
            processor: self.processor.clone(),
            registry: self.registry.clone(),
            workers: self.workers.clone(),
            metals: metals.into(),
            chunk_size: self.config.chunk_size,
        };
        tokio::spawn(run.execute(chunks));
        id
    }

    /// Process a small batch on the caller's task, without a job
    ///
    /// Row ordinals are 1-based source positions.
    pub async fn process_inline(&self, source: RowSource) -> Vec<ProcessedRow> {
        let (rows, metals) = source.into_parts();
        let mut results = Vec::with_capacity(rows.len());

        for (idx, row) in rows.iter().enumerate() {
            let ordinal = idx + 1;
            match self.processor.process(row, &metals, ordinal).await {
                Ok(processed) => {
                    record_processed(&self.processor, None, &processed);
                    results.push(processed);
                }
                Err(reason) => record_skip(&self.processor, None, ordinal, &reason),
            }
        }

        debug!(rows = rows.len(), results = results.len(), "Inline batch finished");
        results
    }
}

fn record_processed(processor: &SampleProcessor, job_id: Option<&str>, row: &ProcessedRow) {
    processor.metrics().inc_rows_processed();
    processor.logger().log_row_processed(
        job_id,
        row.row_id(),
        &row.id,
        row.record.indices.hmpi.score,
        row.record.indices.hmpi.band.label(),
    );
}

fn record_skip(processor: &SampleProcessor, job_id: Option<&str>, ordinal: usize, reason: &SkipReason) {
    processor.metrics().inc_rows_skipped(reason.label());
    processor
        .logger()
        .log_row_skipped(job_id, ordinal, reason.label(), &reason.to_string());
}

/// Everything one background job needs
struct JobRun {
    id: JobId,
    processor: Arc<SampleProcessor>,
    registry: JobRegistry,
    workers: Arc<Semaphore>,
    metals: Arc<[Metal]>,
    chunk_size: usize,
}

impl JobRun {
    async fn execute(self, chunks: Vec<Vec<Row>>) {
        let chunk_count = chunks.len();
        let mut set = JoinSet::new();

        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            let processor = self.processor.clone();
            let registry = self.registry.clone();
            let workers = self.workers.clone();
            let metals = self.metals.clone();
            let id = self.id;
            let base = chunk_index * self.chunk_size;

            set.spawn(async move {
                let _permit = workers
                    .acquire_owned()
                    .await
                    .map_err(|e| HmpiError::Orchestration(format!("worker pool closed: {}", e)))?;

                let job_id = id.to_string();
                let mut results = Vec::with_capacity(chunk.len());
                for (pos, row) in chunk.iter().enumerate() {
                    let ordinal = base + pos + 1;
                    let outcome = processor.process(row, &metals, ordinal).await;
                    registry.record_row_outcome(&id, &outcome);
                    match outcome {
                        Ok(processed) => {
                            record_processed(&processor, Some(&job_id), &processed);
                            results.push(processed);
                        }
                        Err(reason) => record_skip(&processor, Some(&job_id), ordinal, &reason),
                    }
                }
                debug!(job_id = %job_id, chunk = chunk_index, rows = chunk.len(), "Chunk finished");
                Ok::<_, HmpiError>(results)
            });
        }

        info!(job_id = %self.id, chunks = chunk_count, "Dispatched batch chunks");

        let mut all = Vec::new();
        while let Some(joined) = set.join_next().await {
            let error = match joined {
                Ok(Ok(results)) => {
                    all.extend(results);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("chunk task failed: {}", e),
            };
            set.abort_all();
            self.registry.fail(&self.id, error);
            return;
        }

        self.registry.complete(&self.id, all);
    }
}

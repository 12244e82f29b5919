//! Process-local sample store

use super::{DeleteCriteria, SampleId, SampleQuery, SampleRecord, SampleStore, StoredSample};
use crate::error::{HmpiError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// In-memory sample store backed by a concurrent map
///
/// Samples inserted in the same instant keep their insertion order through
/// a sequence number, so "newest first" is stable.
#[derive(Debug, Default)]
pub struct MemorySampleStore {
    samples: DashMap<SampleId, (u64, StoredSample)>,
    sequence: AtomicU64,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert with an explicit creation time
    pub fn insert_at(&self, record: SampleRecord, created_at: DateTime<Utc>) -> SampleId {
        let id = uuid::Uuid::new_v4().to_string();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let stored = StoredSample {
            id: id.clone(),
            created_at,
            record,
        };
        self.samples.insert(id.clone(), (seq, stored));
        debug!(sample_id = %id, "Stored sample");
        id
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[async_trait]
impl SampleStore for MemorySampleStore {
    async fn insert(&self, record: SampleRecord) -> Result<SampleId> {
        Ok(self.insert_at(record, Utc::now()))
    }

    async fn query(&self, query: &SampleQuery) -> Result<Vec<StoredSample>> {
        let now = Utc::now();
        let mut matched: Vec<(u64, StoredSample)> = self
            .samples
            .iter()
            .filter(|entry| query.matches(&entry.value().1, now))
            .map(|entry| entry.value().clone())
            .collect();

        matched.sort_by(|a, b| {
            b.1.created_at
                .cmp(&a.1.created_at)
                .then_with(|| b.0.cmp(&a.0))
        });
        Ok(matched.into_iter().map(|(_, sample)| sample).collect())
    }

    async fn delete(&self, criteria: &DeleteCriteria) -> Result<usize> {
        criteria.validate()?;
        let before = self.samples.len();
        match criteria {
            DeleteCriteria::All => self.samples.clear(),
            DeleteCriteria::Ids(ids) => {
                for id in ids {
                    self.samples.remove(id);
                }
            }
            DeleteCriteria::DateRange { .. } => {
                self.samples.retain(|_, (_, sample)| !criteria.matches(sample));
            }
        }
        Ok(before.saturating_sub(self.samples.len()))
    }

    async fn get_by_id(&self, id: &str) -> Result<StoredSample> {
        self.samples
            .get(id)
            .map(|entry| entry.value().1.clone())
            .ok_or_else(|| HmpiError::SampleNotFound(id.to_string()))
    }
}

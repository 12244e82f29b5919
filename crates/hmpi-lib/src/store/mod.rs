//! Persistence seam for enriched sample records
//!
//! The pipeline only needs four operations from a store. Each operation is
//! atomic on its own; callers add no locking around them.

mod memory;

pub use memory::MemorySampleStore;

use crate::classifier::Prediction;
use crate::error::{HmpiError, Result};
use crate::indices::IndexReport;
use crate::models::{Location, Metal};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Store-assigned sample identifier
pub type SampleId = String;

/// A fully processed sample as handed to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub location: Location,
    /// Concentrations as submitted, before unit conversion
    pub concentrations: BTreeMap<Metal, f64>,
    pub indices: IndexReport,
    pub prediction: Prediction,
    /// 1-based ordinal within the originating batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_id: Option<usize>,
}

/// A record together with its store metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSample {
    pub id: SampleId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: SampleRecord,
}

/// Filter for listing stored samples
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleQuery {
    /// Only samples created within this many days
    pub age_limit_days: Option<u32>,
    /// Case-insensitive substring of the location name
    pub location: Option<String>,
}

impl SampleQuery {
    pub fn matches(&self, sample: &StoredSample, now: DateTime<Utc>) -> bool {
        if let Some(days) = self.age_limit_days {
            if sample.created_at < now - chrono::Duration::days(i64::from(days)) {
                return false;
            }
        }
        match &self.location {
            Some(needle) => sample
                .record
                .location
                .name
                .as_deref()
                .map(|name| name.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
            None => true,
        }
    }
}

/// Which samples a delete removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteCriteria {
    All,
    /// Inclusive on both ends
    DateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Ids(Vec<SampleId>),
}

impl DeleteCriteria {
    /// Reject ranges that end before they start and empty id lists
    pub fn validate(&self) -> Result<()> {
        match self {
            DeleteCriteria::All => Ok(()),
            DeleteCriteria::DateRange { start, end } if start > end => Err(
                HmpiError::InvalidDeleteCriteria(format!("start {} is after end {}", start, end)),
            ),
            DeleteCriteria::DateRange { .. } => Ok(()),
            DeleteCriteria::Ids(ids) if ids.is_empty() => Err(HmpiError::InvalidDeleteCriteria(
                "no sample ids given".to_string(),
            )),
            DeleteCriteria::Ids(_) => Ok(()),
        }
    }

    pub fn matches(&self, sample: &StoredSample) -> bool {
        match self {
            DeleteCriteria::All => true,
            DeleteCriteria::DateRange { start, end } => {
                sample.created_at >= *start && sample.created_at <= *end
            }
            DeleteCriteria::Ids(ids) => ids.contains(&sample.id),
        }
    }
}

/// Trait for sample store implementations
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Persist a record and return its new identifier
    async fn insert(&self, record: SampleRecord) -> Result<SampleId>;

    /// Matching samples, newest first
    async fn query(&self, query: &SampleQuery) -> Result<Vec<StoredSample>>;

    /// Remove matching samples and return how many were removed
    async fn delete(&self, criteria: &DeleteCriteria) -> Result<usize>;

    /// Fails with `SampleNotFound` for unknown ids
    async fn get_by_id(&self, id: &str) -> Result<StoredSample>;
}

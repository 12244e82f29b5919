//! Error types shared across the library

use thiserror::Error;

/// Errors surfaced to callers of the library
#[derive(Debug, Error)]
pub enum HmpiError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("sample not found: {0}")]
    SampleNotFound(String),

    #[error("unknown metal identifier: {0}")]
    UnknownMetal(String),

    #[error("unknown concentration unit: {0}")]
    UnknownUnit(String),

    #[error("invalid delete criteria: {0}")]
    InvalidDeleteCriteria(String),

    #[error("sample store error: {0}")]
    Store(String),

    #[error("batch orchestration failed: {0}")]
    Orchestration(String),
}

impl HmpiError {
    /// Lookup failures, as opposed to computation or infrastructure errors
    pub fn is_not_found(&self) -> bool {
        matches!(self, HmpiError::JobNotFound(_) | HmpiError::SampleNotFound(_))
    }

    /// Errors caused by caller input
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            HmpiError::UnknownMetal(_)
                | HmpiError::UnknownUnit(_)
                | HmpiError::InvalidDeleteCriteria(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HmpiError>;

/// Why a batch row produced no result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    /// No available metal column had a value in the row
    #[error("row has no metal measurements")]
    EmptySample,

    /// The enriched record could not be stored
    #[error("failed to persist sample: {0}")]
    Persistence(String),
}

impl SkipReason {
    /// Stable label used for metrics and skip accounting
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::EmptySample => "empty_sample",
            SkipReason::Persistence(_) => "persistence",
        }
    }
}

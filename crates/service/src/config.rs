//! Service configuration

use anyhow::{Context, Result};
use hmpi_lib::batch::{BatchConfig, ReaperConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration, read from `HMPI_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Name attached to every structured log event
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Rows per batch chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunks processed concurrently across all jobs
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// How long finished jobs stay queryable
    #[serde(default = "default_one_hour")]
    pub job_retention_secs: u64,

    #[serde(default = "default_one_hour")]
    pub reaper_interval_secs: u64,

    /// Batches up to this size are processed inline
    #[serde(default = "default_sync_batch_limit")]
    pub sync_batch_limit: usize,

    /// Optional ONNX classifier model
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// Comma-separated class labels in model output order
    #[serde(default = "default_model_labels")]
    pub model_labels: String,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "hmpi-service".to_string())
}

fn default_api_port() -> u16 {
    8000
}

fn default_chunk_size() -> usize {
    100
}

fn default_max_workers() -> usize {
    4
}

fn default_one_hour() -> u64 {
    3600
}

fn default_sync_batch_limit() -> usize {
    100
}

fn default_model_labels() -> String {
    "Critical,Moderate,Safe".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            chunk_size: default_chunk_size(),
            max_workers: default_max_workers(),
            job_retention_secs: default_one_hour(),
            reaper_interval_secs: default_one_hour(),
            sync_batch_limit: default_sync_batch_limit(),
            model_path: None,
            model_labels: default_model_labels(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("HMPI"))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid HMPI_* configuration")
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            chunk_size: self.chunk_size,
            max_workers: self.max_workers,
        }
    }

    pub fn reaper_config(&self) -> ReaperConfig {
        ReaperConfig {
            interval: Duration::from_secs(self.reaper_interval_secs.max(1)),
        }
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    pub fn labels(&self) -> Vec<String> {
        self.model_labels
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.api_port, 8000);
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.job_retention(), Duration::from_secs(3600));
        assert_eq!(config.reaper_config().interval, Duration::from_secs(3600));
        assert!(config.model_path.is_none());
        assert_eq!(config.labels(), vec!["Critical", "Moderate", "Safe"]);
    }

    #[test]
    fn test_empty_source_uses_defaults() {
        let config: ServiceConfig = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.sync_batch_limit, 100);
        assert_eq!(config.reaper_interval_secs, 3600);
    }

    #[test]
    fn test_labels_are_trimmed() {
        let config = ServiceConfig {
            model_labels: " Low , High,,".to_string(),
            ..Default::default()
        };
        assert_eq!(config.labels(), vec!["Low", "High"]);
    }
}

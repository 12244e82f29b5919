//! ONNX model inference using tract
//!
//! The model takes a `[1, 10]` f32 input in canonical metal order and its
//! last output holds one probability per label.

use super::{Classifier, FallbackClassifier, Prediction};
use crate::models::{FeatureVector, METAL_COUNT};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

/// Label order of a label-encoded model (alphabetical)
pub const DEFAULT_LABELS: [&str; 3] = ["Critical", "Moderate", "Safe"];

/// Inference latency above which a warning is logged
const MAX_INFERENCE_MS: u128 = 5;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Classifier backed by an ONNX model
pub struct OnnxClassifier {
    model: Option<TractModel>,
    labels: Vec<String>,
    model_version: String,
    inference_count: AtomicU64,
    slow_inference_count: AtomicU64,
}

impl OnnxClassifier {
    /// Create a classifier without a model (every prediction is the fallback)
    pub fn new_without_model() -> Self {
        Self {
            model: None,
            labels: default_labels(),
            model_version: FallbackClassifier::VERSION.to_string(),
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        }
    }

    /// Create a classifier from model bytes
    pub fn new(model_bytes: &[u8], labels: Vec<String>, model_version: &str) -> Result<Self> {
        if labels.is_empty() {
            anyhow::bail!("At least one class label is required");
        }
        let model = Self::load_model(model_bytes)?;
        Ok(Self {
            model: Some(model),
            labels,
            model_version: model_version.to_string(),
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        })
    }

    /// Load a model file; the file stem becomes the model version
    pub fn from_file(path: &Path, labels: Vec<String>) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read model file {}", path.display()))?;
        let version = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown");
        let classifier = Self::new(&bytes, labels, version)?;
        info!(path = %path.display(), version = %version, "Loaded classifier model");
        Ok(classifier)
    }

    /// Load and optimize an ONNX model from bytes
    fn load_model(model_bytes: &[u8]) -> Result<TractModel> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, METAL_COUNT]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(model)
    }

    fn features_to_tensor(&self, features: &FeatureVector) -> Result<Tensor> {
        let data: Vec<f32> = features.as_slice().iter().map(|v| *v as f32).collect();
        let array = tract_ndarray::Array2::from_shape_vec((1, METAL_COUNT), data)
            .context("Failed to shape feature tensor")?;
        Ok(array.into())
    }

    fn tensor_to_prediction(&self, output: &Tensor) -> Result<Prediction> {
        let view = output.to_array_view::<f32>()?;
        let values: Vec<f32> = view.iter().copied().collect();

        if values.len() < self.labels.len() {
            anyhow::bail!(
                "Model output has {} values, expected {}",
                values.len(),
                self.labels.len()
            );
        }

        let probabilities: std::collections::BTreeMap<String, f64> = self
            .labels
            .iter()
            .zip(values.iter())
            .map(|(label, p)| (label.clone(), f64::from(*p)))
            .collect();

        let label = self
            .labels
            .iter()
            .zip(values.iter())
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(label, _)| label.clone())
            .context("Model produced no probabilities")?;

        Ok(Prediction {
            label,
            probabilities,
        })
    }

    /// Get inference statistics
    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_inferences: self.inference_count.load(Ordering::Relaxed),
            slow_inferences: self.slow_inference_count.load(Ordering::Relaxed),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction> {
        let Some(model) = self.model.as_ref() else {
            debug!("No model loaded, using fallback classifier");
            return Ok(FallbackClassifier::prediction());
        };

        let start = Instant::now();
        let input = self.features_to_tensor(features)?;
        let result = model.run(tvec!(input.into()))?;
        let output = result.last().context("No output from model")?;

        let elapsed = start.elapsed();
        self.inference_count.fetch_add(1, Ordering::Relaxed);

        if elapsed.as_millis() > MAX_INFERENCE_MS {
            self.slow_inference_count.fetch_add(1, Ordering::Relaxed);
            warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms target", MAX_INFERENCE_MS);
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Inference completed");
        }

        self.tensor_to_prediction(output)
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}

/// Inference statistics
#[derive(Debug, Clone)]
pub struct InferenceStats {
    pub total_inferences: u64,
    pub slow_inferences: u64,
}

fn default_labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metal, Sample};
    use std::io::Write;

    #[test]
    fn test_without_model_uses_fallback() {
        let classifier = OnnxClassifier::new_without_model();
        let features = FeatureVector::from_sample(&Sample::new().with(Metal::Lead, 400.0));
        let prediction = classifier.predict(&features).unwrap();

        assert_eq!(prediction, FallbackClassifier::prediction());
        assert!(!classifier.is_trained());
        assert_eq!(classifier.model_version(), "fallback");
        assert_eq!(classifier.stats().total_inferences, 0);
    }

    #[test]
    fn test_invalid_model_bytes_rejected() {
        let result = OnnxClassifier::new(b"not an onnx model", default_labels(), "v1");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_labels_rejected() {
        let result = OnnxClassifier::new(b"", Vec::new(), "v1");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = OnnxClassifier::from_file(&dir.path().join("absent.onnx"), default_labels());
        assert!(result.is_err());
    }

    #[test]
    fn test_corrupt_model_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x00\x01garbage").unwrap();
        assert!(OnnxClassifier::from_file(file.path(), default_labels()).is_err());
    }

    #[test]
    fn test_output_tensor_mapping() {
        let classifier = OnnxClassifier::new_without_model();
        let output: Tensor = tract_ndarray::Array2::from_shape_vec((1, 3), vec![0.1f32, 0.7, 0.2])
            .unwrap()
            .into();
        let prediction = classifier.tensor_to_prediction(&output).unwrap();

        assert_eq!(prediction.label, "Moderate");
        assert!((prediction.probabilities["Moderate"] - 0.7).abs() < 1e-6);
        assert!((prediction.probabilities["Critical"] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_short_output_tensor_rejected() {
        let classifier = OnnxClassifier::new_without_model();
        let output: Tensor = tract_ndarray::Array2::from_shape_vec((1, 2), vec![0.5f32, 0.5])
            .unwrap()
            .into();
        assert!(classifier.tensor_to_prediction(&output).is_err());
    }
}

//! Pollution class prediction
//!
//! The classifier is a black box that maps the ten-metal feature vector to a
//! label and a probability per label. When no model is available, or the
//! model fails, callers get a Safe-leaning default instead of an error.

mod onnx;

pub use onnx::{InferenceStats, OnnxClassifier, DEFAULT_LABELS};

use crate::models::FeatureVector;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Predicted label with the probability distribution over all labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub probabilities: BTreeMap<String, f64>,
}

/// Trait for classifier implementations
pub trait Classifier: Send + Sync {
    /// Predict a label for a canonical-order feature vector
    fn predict(&self, features: &FeatureVector) -> Result<Prediction>;

    /// Version string of the loaded model
    fn model_version(&self) -> &str;

    /// False when predictions come from the fallback distribution
    fn is_trained(&self) -> bool;
}

/// Classifier used when no trained model is available
pub struct FallbackClassifier;

impl FallbackClassifier {
    pub const VERSION: &'static str = "fallback";

    /// Default distribution: everything on Safe
    pub fn prediction() -> Prediction {
        let probabilities = [("Safe", 1.0), ("Moderate", 0.0), ("Critical", 0.0)]
            .into_iter()
            .map(|(label, p)| (label.to_string(), p))
            .collect();
        Prediction {
            label: "Safe".to_string(),
            probabilities,
        }
    }
}

impl Classifier for FallbackClassifier {
    fn predict(&self, _features: &FeatureVector) -> Result<Prediction> {
        Ok(Self::prediction())
    }

    fn model_version(&self) -> &str {
        Self::VERSION
    }

    fn is_trained(&self) -> bool {
        false
    }
}

//! Per-sample processing
//!
//! Turns one raw row into one enriched, stored record: extract the metals,
//! detect the unit, compute indices, classify, persist.

use crate::classifier::{Classifier, FallbackClassifier, Prediction};
use crate::error::{Result, SkipReason};
use crate::indices::{
    comprehensive_indices_with_unit, convert_to_canonical, recommend_actions, IndexReport,
    Recommendations,
};
use crate::models::{CellValue, FeatureVector, Location, Metal, Row, Sample, Unit};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::store::{SampleId, SampleRecord, SampleStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Location-name columns, in lookup order
const LOCATION_COLUMNS: &[&str] = &["location_name", "Location", "location", "Location_Name"];
const LATITUDE_COLUMNS: &[&str] = &["latitude", "Latitude"];
const LONGITUDE_COLUMNS: &[&str] = &["longitude", "Longitude"];

/// Location name for single samples submitted without one
pub const DEFAULT_LOCATION_NAME: &str = "Unknown";

/// A batch row that produced a stored result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRow {
    pub id: SampleId,
    #[serde(flatten)]
    pub record: SampleRecord,
}

impl ProcessedRow {
    /// 1-based ordinal of the row in its batch
    pub fn row_id(&self) -> usize {
        self.record.row_id.unwrap_or(0)
    }
}

/// Result of analyzing one submitted sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleAnalysis {
    pub id: SampleId,
    #[serde(flatten)]
    pub record: SampleRecord,
    pub recommendations: Recommendations,
}

/// Combines index computation, classification and persistence
pub struct SampleProcessor {
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn SampleStore>,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl SampleProcessor {
    pub fn new(classifier: Arc<dyn Classifier>, store: Arc<dyn SampleStore>) -> Self {
        Self {
            classifier,
            store,
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new("hmpi"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn SampleStore> {
        &self.store
    }

    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    /// Process one batch row and persist the result
    ///
    /// Skips rows where no available metal column holds a value and rows
    /// the store refuses. Neither is an error for the surrounding batch.
    pub async fn process(
        &self,
        row: &Row,
        available_metals: &[Metal],
        ordinal: usize,
    ) -> std::result::Result<ProcessedRow, SkipReason> {
        let start = Instant::now();

        let mut sample = extract_sample(row, available_metals).ok_or(SkipReason::EmptySample)?;
        sample.location = extract_location(row).unwrap_or_default();
        if sample.location.name.is_none() {
            sample.location.name = Some(format!("Batch Sample {}", ordinal));
        }

        let (indices, prediction) = self.evaluate(&sample, None);
        let record = SampleRecord {
            location: sample.location,
            concentrations: sample.concentrations,
            indices,
            prediction,
            row_id: Some(ordinal),
        };

        let id = self
            .store
            .insert(record.clone())
            .await
            .map_err(|e| SkipReason::Persistence(e.to_string()))?;

        self.metrics
            .observe_sample_processing(start.elapsed().as_secs_f64());

        Ok(ProcessedRow { id, record })
    }

    /// Analyze and persist a single sample
    ///
    /// `unit` overrides detection. Store failures surface as errors here,
    /// unlike in batch processing.
    pub async fn analyze(&self, mut sample: Sample, unit: Option<Unit>) -> Result<SampleAnalysis> {
        let start = Instant::now();

        if sample.location.name.is_none() {
            sample.location.name = Some(DEFAULT_LOCATION_NAME.to_string());
        }

        let (indices, prediction) = self.evaluate(&sample, unit);
        let recommendations = recommend_actions(&indices);
        let record = SampleRecord {
            location: sample.location,
            concentrations: sample.concentrations,
            indices,
            prediction,
            row_id: None,
        };

        let id = self.store.insert(record.clone()).await?;

        self.metrics
            .observe_sample_processing(start.elapsed().as_secs_f64());
        self.logger.log_sample_analyzed(
            &id,
            record.indices.hmpi.score,
            record.indices.hmpi.band.label(),
            &record.prediction.label,
        );

        Ok(SampleAnalysis {
            id,
            record,
            recommendations,
        })
    }

    /// Compute indices and the class prediction without persisting
    pub fn evaluate(&self, sample: &Sample, unit: Option<Unit>) -> (IndexReport, Prediction) {
        let indices = comprehensive_indices_with_unit(sample, unit);
        let canonical = convert_to_canonical(sample, indices.unit_detected);
        let prediction = self.classify(&FeatureVector::from_sample(&canonical));
        (indices, prediction)
    }

    /// Untrained classifiers and inference errors both count as fallbacks
    fn classify(&self, features: &FeatureVector) -> Prediction {
        let fallback_reason = match self.classifier.predict(features) {
            Ok(prediction) if self.classifier.is_trained() => return prediction,
            Ok(_) => "no model loaded".to_string(),
            Err(e) => e.to_string(),
        };
        self.metrics.inc_classifier_fallbacks();
        self.logger
            .log_classifier_fallback(self.classifier.model_version(), &fallback_reason);
        FallbackClassifier::prediction()
    }
}

fn lookup<'a>(row: &'a Row, column: &str) -> Option<&'a CellValue> {
    row.get(column).or_else(|| {
        row.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    })
}

/// Pull the available metals out of a row
///
/// Returns `None` when none of them holds a value. Otherwise every available
/// metal is present; missing or non-numeric cells read as 0.0.
pub fn extract_sample(row: &Row, available_metals: &[Metal]) -> Option<Sample> {
    let mut sample = Sample::new();
    let mut any_value = false;

    for metal in available_metals {
        let value = match lookup(row, metal.name()) {
            Some(cell) if !cell.is_missing() => {
                any_value = true;
                cell.as_f64().unwrap_or(0.0)
            }
            _ => 0.0,
        };
        sample.set(*metal, value);
    }

    any_value.then_some(sample)
}

fn first_cell<'a>(row: &'a Row, columns: &[&str]) -> Option<&'a CellValue> {
    columns
        .iter()
        .filter_map(|c| row.get(*c))
        .find(|cell| !cell.is_missing())
}

/// Location fields of a row, if any are present
pub fn extract_location(row: &Row) -> Option<Location> {
    let location = Location {
        name: first_cell(row, LOCATION_COLUMNS).and_then(CellValue::as_text),
        latitude: first_cell(row, LATITUDE_COLUMNS).and_then(CellValue::as_f64),
        longitude: first_cell(row, LONGITUDE_COLUMNS).and_then(CellValue::as_f64),
    };
    (location != Location::default()).then_some(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::OnnxClassifier;
    use crate::error::HmpiError;
    use crate::indices::Band;
    use crate::store::{DeleteCriteria, MemorySampleStore, SampleQuery, StoredSample};
    use async_trait::async_trait;

    fn row(pairs: &[(&str, CellValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn processor() -> (SampleProcessor, Arc<MemorySampleStore>) {
        let store = Arc::new(MemorySampleStore::new());
        let processor = SampleProcessor::new(Arc::new(FallbackClassifier), store.clone());
        (processor, store)
    }

    /// Store that refuses every write
    struct FailingStore;

    #[async_trait]
    impl SampleStore for FailingStore {
        async fn insert(&self, _record: SampleRecord) -> Result<SampleId> {
            Err(HmpiError::Store("connection refused".into()))
        }

        async fn query(&self, _query: &SampleQuery) -> Result<Vec<StoredSample>> {
            Ok(vec![])
        }

        async fn delete(&self, _criteria: &DeleteCriteria) -> Result<usize> {
            Ok(0)
        }

        async fn get_by_id(&self, id: &str) -> Result<StoredSample> {
            Err(HmpiError::SampleNotFound(id.to_string()))
        }
    }

    /// Classifier that always errors
    struct BrokenClassifier;

    impl Classifier for BrokenClassifier {
        fn predict(&self, _features: &FeatureVector) -> anyhow::Result<Prediction> {
            anyhow::bail!("model not loaded")
        }

        fn model_version(&self) -> &str {
            "broken"
        }

        fn is_trained(&self) -> bool {
            true
        }
    }

    /// Classifier that records the features it was given
    struct RecordingClassifier {
        seen: std::sync::Mutex<Vec<FeatureVector>>,
    }

    impl Classifier for RecordingClassifier {
        fn predict(&self, features: &FeatureVector) -> anyhow::Result<Prediction> {
            self.seen.lock().unwrap().push(*features);
            Ok(FallbackClassifier::prediction())
        }

        fn model_version(&self) -> &str {
            "recording"
        }

        fn is_trained(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_extract_sample_defaults_and_coercion() {
        let r = row(&[
            ("arsenic", CellValue::Number(5.0)),
            ("lead", "bad".into()),
            ("zinc", CellValue::Null),
        ]);
        let sample = extract_sample(&r, &[Metal::Arsenic, Metal::Lead, Metal::Zinc]).unwrap();

        assert_eq!(sample.get(Metal::Arsenic), Some(5.0));
        assert_eq!(sample.get(Metal::Lead), Some(0.0));
        assert_eq!(sample.get(Metal::Zinc), Some(0.0));
        assert_eq!(sample.get(Metal::Iron), None);
    }

    #[test]
    fn test_extract_sample_empty_row() {
        let r = row(&[("arsenic", CellValue::Null), ("site", "A".into())]);
        assert!(extract_sample(&r, &[Metal::Arsenic, Metal::Lead]).is_none());
        assert!(extract_sample(&r, &[]).is_none());
    }

    #[test]
    fn test_extract_location_aliases() {
        let r = row(&[
            ("Location", "North Well".into()),
            ("Latitude", CellValue::Number(12.5)),
            ("longitude", "77.1".into()),
        ]);
        let location = extract_location(&r).unwrap();
        assert_eq!(location.name.as_deref(), Some("North Well"));
        assert_eq!(location.latitude, Some(12.5));
        assert_eq!(location.longitude, Some(77.1));

        assert!(extract_location(&row(&[("lead", CellValue::Number(1.0))])).is_none());
    }

    #[tokio::test]
    async fn test_process_row_with_fallback_location() {
        let (processor, store) = processor();
        let r = row(&[
            ("arsenic", CellValue::Number(5.0)),
            ("lead", CellValue::Number(5.0)),
        ]);

        let processed = processor
            .process(&r, &[Metal::Arsenic, Metal::Lead], 7)
            .await
            .unwrap();

        assert_eq!(processed.row_id(), 7);
        assert_eq!(
            processed.record.location.name.as_deref(),
            Some("Batch Sample 7")
        );
        assert_eq!(processed.record.indices.hmpi.score, 50.0);
        assert_eq!(processed.record.indices.hmpi.band, Band::Safe);
        assert_eq!(processed.record.prediction.label, "Safe");
        assert!(store.get_by_id(&processed.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_process_skips_empty_row() {
        let (processor, store) = processor();
        let r = row(&[("site", "A".into())]);

        let outcome = processor.process(&r, &[Metal::Lead], 1).await;
        assert_eq!(outcome.unwrap_err(), SkipReason::EmptySample);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_skips_row() {
        let processor = SampleProcessor::new(Arc::new(FallbackClassifier), Arc::new(FailingStore));
        let r = row(&[("lead", CellValue::Number(3.0))]);

        let outcome = processor.process(&r, &[Metal::Lead], 1).await;
        assert!(matches!(outcome, Err(SkipReason::Persistence(msg)) if msg.contains("connection refused")));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_in_single_analysis() {
        let processor = SampleProcessor::new(Arc::new(FallbackClassifier), Arc::new(FailingStore));
        let result = processor
            .analyze(Sample::new().with(Metal::Lead, 3.0), None)
            .await;
        assert!(matches!(result, Err(HmpiError::Store(_))));
    }

    fn fallback_count() -> f64 {
        prometheus::gather()
            .iter()
            .find(|f| f.get_name() == "hmpi_classifier_fallbacks_total")
            .map(|f| f.get_metric()[0].get_counter().get_value())
            .unwrap_or(0.0)
    }

    #[tokio::test]
    async fn test_untrained_classifier_counts_fallback() {
        let processor = SampleProcessor::new(
            Arc::new(OnnxClassifier::new_without_model()),
            Arc::new(MemorySampleStore::new()),
        );

        let before = fallback_count();
        let analysis = processor
            .analyze(Sample::new().with(Metal::Lead, 400.0), None)
            .await
            .unwrap();

        assert_eq!(analysis.record.prediction, FallbackClassifier::prediction());
        assert!(fallback_count() > before);
    }

    #[tokio::test]
    async fn test_broken_classifier_falls_back() {
        let store = Arc::new(MemorySampleStore::new());
        let processor = SampleProcessor::new(Arc::new(BrokenClassifier), store);

        let analysis = processor
            .analyze(Sample::new().with(Metal::Mercury, 4.0), None)
            .await
            .unwrap();
        assert_eq!(analysis.record.prediction, FallbackClassifier::prediction());
        assert_eq!(analysis.record.indices.hmpi.band, Band::Critical);
    }

    #[tokio::test]
    async fn test_classifier_sees_canonical_units() {
        let classifier = Arc::new(RecordingClassifier {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let processor =
            SampleProcessor::new(classifier.clone(), Arc::new(MemorySampleStore::new()));

        processor
            .analyze(Sample::new().with(Metal::Arsenic, 0.005), None)
            .await
            .unwrap();

        let seen = classifier.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!((seen[0].0[Metal::Arsenic.index()] - 5.0).abs() < 1e-9);
        assert_eq!(seen[0].0[Metal::Lead.index()], 0.0);
    }

    #[tokio::test]
    async fn test_same_sample_twice_gives_distinct_ids_same_indices() {
        let (processor, store) = processor();
        let sample = Sample::new()
            .with(Metal::Cadmium, 2.5)
            .with(Metal::Nickel, 14.0);

        let first = processor.analyze(sample.clone(), None).await.unwrap();
        let second = processor.analyze(sample, None).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.record.indices, second.record.indices);
        assert_eq!(first.record.location.name.as_deref(), Some(DEFAULT_LOCATION_NAME));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_explicit_unit_and_recommendations() {
        let (processor, _) = processor();
        let analysis = processor
            .analyze(
                Sample::new().with(Metal::Lead, 5.0),
                Some(Unit::MilligramsPerLiter),
            )
            .await
            .unwrap();

        assert_eq!(analysis.record.indices.unit_detected, Unit::MilligramsPerLiter);
        assert!(analysis
            .recommendations
            .actions
            .iter()
            .any(|a| a.contains("lead")));
    }
}

//! HTTP API: analysis endpoints, health checks and Prometheus metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use hmpi_lib::{
    batch::{BatchOrchestrator, JobId, JobStatus, JobStatusView},
    health::{ComponentStatus, HealthRegistry},
    observability::PipelineMetrics,
    processor::{ProcessedRow, SampleAnalysis},
    store::{DeleteCriteria, SampleQuery, StoredSample},
    CellValue, HmpiError, Location, Metal, Row, RowSource, Sample, Unit,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

/// Default history window for sample listings
const DEFAULT_HISTORY_DAYS: u32 = 30;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: PipelineMetrics,
    pub orchestrator: Arc<BatchOrchestrator>,
    pub sync_batch_limit: usize,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        orchestrator: Arc<BatchOrchestrator>,
        sync_batch_limit: usize,
    ) -> Self {
        Self {
            health_registry,
            metrics: PipelineMetrics::new(),
            orchestrator,
            sync_batch_limit,
        }
    }
}

/// Library error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(HmpiError);

impl From<HmpiError> for ApiError {
    fn from(e: HmpiError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = if self.0.is_not_found() {
            (StatusCode::NOT_FOUND, "not_found")
        } else if self.0.is_invalid_input() {
            (StatusCode::BAD_REQUEST, "invalid_input")
        } else {
            error!(error = %self.0, "Request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        };

        (status, Json(json!({ "error": self.0.to_string(), "code": code }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Single-sample analysis request
///
/// Metal concentrations are top-level keys named after the metal.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// `"Auto-detect"` (default), `"mg/L"` or `"µg/L"`
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(flatten)]
    pub metals: BTreeMap<String, CellValue>,
}

impl AnalyzeRequest {
    pub fn into_sample(self) -> Result<(Sample, Option<Unit>), HmpiError> {
        let unit = match self.unit.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(u) if u.eq_ignore_ascii_case("auto-detect") => None,
            Some(u) => Some(u.parse::<Unit>()?),
        };

        let mut sample = Sample::new();
        for (key, value) in &self.metals {
            let metal: Metal = key.parse()?;
            if !value.is_missing() {
                sample.set(metal, value.as_f64().unwrap_or(0.0));
            }
        }
        sample.location = Location {
            name: self.location_name.filter(|n| !n.trim().is_empty()),
            latitude: self.latitude,
            longitude: self.longitude,
        };

        Ok((sample, unit))
    }
}

/// Batch analysis request
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub samples: Vec<Row>,
    /// Metal columns; inferred from the rows when absent
    #[serde(default)]
    pub metals: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchCompletedResponse {
    pub status: JobStatus,
    pub total_samples: usize,
    pub processed_samples: usize,
    pub results: Vec<ProcessedRow>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchAcceptedResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub total_samples: usize,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SamplesParams {
    /// 0 disables the age filter
    pub days: Option<u32>,
    pub location: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SamplesResponse {
    pub count: usize,
    pub samples: Vec<StoredSample>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    /// `all`, `date_range` or `selected`
    pub delete_option: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub sample_ids: Option<Vec<String>>,
}

impl DeleteRequest {
    pub fn into_criteria(self) -> Result<DeleteCriteria, HmpiError> {
        let criteria = match self.delete_option.as_str() {
            "all" => DeleteCriteria::All,
            "date_range" => DeleteCriteria::DateRange {
                start: parse_bound(self.start_date.as_deref(), "start_date", false)?,
                end: parse_bound(self.end_date.as_deref(), "end_date", true)?,
            },
            "selected" => DeleteCriteria::Ids(self.sample_ids.unwrap_or_default()),
            other => {
                return Err(HmpiError::InvalidDeleteCriteria(format!(
                    "unknown delete_option '{}'",
                    other
                )))
            }
        };
        criteria.validate()?;
        Ok(criteria)
    }
}

/// RFC 3339 timestamp or plain date; a plain end date covers the whole day
fn parse_bound(value: Option<&str>, field: &str, end_of_day: bool) -> Result<DateTime<Utc>, HmpiError> {
    let raw = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| HmpiError::InvalidDeleteCriteria(format!("{} is required", field)))?;

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let invalid = || HmpiError::InvalidDeleteCriteria(format!("{} is not a valid date: {}", field, raw));
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())?;
    let naive = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    }
    .ok_or_else(invalid)?;
    Ok(Utc.from_utc_datetime(&naive))
}

async fn root() -> impl IntoResponse {
    Json(json!({ "message": "Water Quality Monitoring API", "version": env!("CARGO_PKG_VERSION") }))
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn analyze_sample(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<SampleAnalysis>> {
    let (sample, unit) = request.into_sample()?;
    let analysis = state.orchestrator.processor().analyze(sample, unit).await?;
    Ok(Json(analysis))
}

/// Small batches run inline; larger ones become a job
async fn batch_analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<Response> {
    let source = match request.metals {
        Some(names) => RowSource::new(request.samples, &names)?,
        None => RowSource::from_rows(request.samples),
    };
    let total_samples = source.len();

    if total_samples <= state.sync_batch_limit {
        let results = state.orchestrator.process_inline(source).await;
        let body = BatchCompletedResponse {
            status: JobStatus::Completed,
            total_samples,
            processed_samples: results.len(),
            results,
        };
        return Ok(Json(body).into_response());
    }

    let job_id = state.orchestrator.submit(source);
    info!(job_id = %job_id, total_samples, "Accepted batch for background processing");

    let body = BatchAcceptedResponse {
        job_id,
        status: JobStatus::Processing,
        total_samples,
        message: format!("Processing {} samples in background", total_samples),
    };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

async fn batch_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusView>> {
    Ok(Json(state.orchestrator.registry().status(&job_id)?))
}

async fn list_samples(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SamplesParams>,
) -> ApiResult<Json<SamplesResponse>> {
    let query = SampleQuery {
        age_limit_days: Some(params.days.unwrap_or(DEFAULT_HISTORY_DAYS)).filter(|d| *d > 0),
        location: params.location.filter(|l| !l.trim().is_empty()),
    };
    let samples = state.orchestrator.processor().store().query(&query).await?;
    Ok(Json(SamplesResponse {
        count: samples.len(),
        samples,
    }))
}

async fn get_sample(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<StoredSample>> {
    Ok(Json(state.orchestrator.processor().store().get_by_id(&id).await?))
}

async fn delete_samples(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let criteria = request.into_criteria()?;
    let deleted = state.orchestrator.processor().store().delete(&criteria).await?;
    info!(deleted, "Deleted samples");
    Ok(Json(json!({ "deleted_count": deleted })))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/analyze-sample", post(analyze_sample))
        .route("/batch-analyze", post(batch_analyze))
        .route("/batch-status/:job_id", get(batch_status))
        .route("/samples", get(list_samples).delete(delete_samples))
        .route("/samples/:id", get(get_sample))
        .with_state(state)
}

/// Start the API server; returns when `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: serde_json::Value) -> AnalyzeRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_analyze_request_to_sample() {
        let (sample, unit) = request(json!({
            "arsenic": 5.0,
            "Lead": "5",
            "zinc": null,
            "location_name": "Well 3",
            "unit": "Auto-detect"
        }))
        .into_sample()
        .unwrap();

        assert!(unit.is_none());
        assert_eq!(sample.get(Metal::Arsenic), Some(5.0));
        assert_eq!(sample.get(Metal::Lead), Some(5.0));
        assert_eq!(sample.get(Metal::Zinc), None);
        assert_eq!(sample.location.name.as_deref(), Some("Well 3"));
    }

    #[test]
    fn test_analyze_request_rejects_unknown_metal_and_unit() {
        let err = request(json!({ "gold": 1.0 })).into_sample().unwrap_err();
        assert!(matches!(err, HmpiError::UnknownMetal(_)));

        let err = request(json!({ "lead": 1.0, "unit": "ppm" })).into_sample().unwrap_err();
        assert!(matches!(err, HmpiError::UnknownUnit(_)));

        let (_, unit) = request(json!({ "lead": 1.0, "unit": "mg/L" })).into_sample().unwrap();
        assert_eq!(unit, Some(Unit::MilligramsPerLiter));
    }

    #[test]
    fn test_delete_request_criteria() {
        let criteria = DeleteRequest {
            delete_option: "date_range".into(),
            start_date: Some("2024-01-01".into()),
            end_date: Some("2024-01-31".into()),
            sample_ids: None,
        }
        .into_criteria()
        .unwrap();
        match criteria {
            DeleteCriteria::DateRange { start, end } => {
                assert_eq!(start.to_rfc3339(), "2024-01-01T00:00:00+00:00");
                assert!(end > Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 0).unwrap());
            }
            other => panic!("unexpected criteria {:?}", other),
        }

        let missing_end = DeleteRequest {
            delete_option: "date_range".into(),
            start_date: Some("2024-01-01".into()),
            end_date: None,
            sample_ids: None,
        };
        assert!(missing_end.into_criteria().is_err());

        let no_ids = DeleteRequest {
            delete_option: "selected".into(),
            start_date: None,
            end_date: None,
            sample_ids: None,
        };
        assert!(no_ids.into_criteria().is_err());

        let bogus = DeleteRequest {
            delete_option: "some".into(),
            start_date: None,
            end_date: None,
            sample_ids: None,
        };
        assert!(matches!(
            bogus.into_criteria(),
            Err(HmpiError::InvalidDeleteCriteria(_))
        ));
    }
}

//! API client for communicating with the HMPI service

use anyhow::{Context, Result};
use hmpi_lib::processor::ProcessedRow;
use hmpi_lib::store::StoredSample;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the HMPI service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("Invalid path")
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.send().await.context("Failed to send request")?;
        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Self::send(self.client.get(self.url(path)?)).await
    }

    /// Make a GET request with query parameters
    pub async fn get_with_query<T: DeserializeOwned, Q: Serialize>(&self, path: &str, query: &Q) -> Result<T> {
        Self::send(self.client.get(self.url(path)?).query(query)).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        Self::send(self.client.post(self.url(path)?).json(body)).await
    }

    /// Make a DELETE request with JSON body
    pub async fn delete<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        Self::send(self.client.delete(self.url(path)?).json(body)).await
    }
}

// API request and response types

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Response of `POST /batch-analyze`, inline or accepted as a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub status: String,
    pub total_samples: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_samples: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ProcessedRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleList {
    pub count: usize,
    pub samples: Vec<StoredSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplesQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub delete_option: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmpi_lib::batch::{JobStatus, JobStatusView};
    use serde_json::json;

    #[tokio::test]
    async fn test_get_job_status() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "job_id": "6f1c1f7e-8d0e-4b8a-9a51-3d1f1a0f2b11",
            "status": "processing",
            "progress": 40.0,
            "processed": 40,
            "total": 100,
            "skipped": { "empty_sample": 2 },
            "created_at": "2024-05-01T10:00:00Z"
        });
        let mock = server
            .mock("GET", "/batch-status/6f1c1f7e-8d0e-4b8a-9a51-3d1f1a0f2b11")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let view: JobStatusView = client
            .get("batch-status/6f1c1f7e-8d0e-4b8a-9a51-3d1f1a0f2b11")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(view.status, JobStatus::Processing);
        assert_eq!(view.processed, 40);
        assert_eq!(view.skipped["empty_sample"], 2);
        assert!(view.results.is_none());
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/samples/missing")
            .with_status(404)
            .with_body(r#"{"error":"sample not found: missing","code":"not_found"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.get::<StoredSample>("samples/missing").await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("404"));
        assert!(message.contains("sample not found: missing"));
    }

    #[tokio::test]
    async fn test_delete_sends_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/samples")
            .match_body(mockito::Matcher::Json(json!({ "delete_option": "all" })))
            .with_status(200)
            .with_body(r#"{"deleted_count":3}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let request = DeleteRequest {
            delete_option: "all".into(),
            start_date: None,
            end_date: None,
            sample_ids: None,
        };
        let response: DeleteResponse = client.delete("samples", &request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.deleted_count, 3);
    }

    #[test]
    fn test_accepted_batch_response() {
        tokio_test::block_on(async {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("POST", "/batch-analyze")
                .with_status(202)
                .with_body(
                    r#"{"job_id":"abc","status":"processing","total_samples":500,"message":"Processing 500 samples in background"}"#,
                )
                .create_async()
                .await;

            let client = ApiClient::new(&server.url()).unwrap();
            let response: BatchResponse = client
                .post("batch-analyze", &json!({ "samples": [] }))
                .await
                .unwrap();

            assert_eq!(response.status, "processing");
            assert_eq!(response.job_id.as_deref(), Some("abc"));
            assert!(response.results.is_none());
        });
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}

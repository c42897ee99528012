//! Diagnosis backend client
//!
//! Provides the `DiagnosisApi` trait, the orchestrator's only route to the
//! outside world, and `HttpDiagnosisClient`, its implementation over the
//! backend's REST API (`/api/...`).
//!
//! Idempotent reads (preview, listings, history) retry transient failures with
//! exponential backoff. Writes (upload, index, query, feedback, history
//! append) are sent once.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::{ApiConfig, FaultscopeConfig};
use crate::error::FaultscopeError;
use crate::models::{FeedbackRating, FileMetadata, HistoryEntry, KbFileMetadata, PreviewTable, RawDiagnosis};

// ============================================================================
// DiagnosisApi trait
// ============================================================================

/// Abstraction over the diagnosis backend.
#[async_trait]
pub trait DiagnosisApi: Send + Sync {
    /// Store a log file. The returned filename is canonical and may differ
    /// from the one submitted.
    async fn upload_log(&self, filename: &str, contents: Vec<u8>) -> Result<UploadResponse, ApiError>;

    async fn preview(&self, filename: &str) -> Result<PreviewTable, ApiError>;

    /// Index an uploaded log. Safe to repeat.
    async fn process_log(&self, filename: &str) -> Result<ProcessResponse, ApiError>;

    /// Index every document under a knowledge-base path.
    async fn process_knowledge_base(&self, path: &str) -> Result<ProcessResponse, ApiError>;

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, ApiError>;

    async fn submit_feedback(&self, request: &FeedbackRequest) -> Result<(), ApiError>;

    async fn save_history(&self, request: &HistorySaveRequest) -> Result<(), ApiError>;

    async fn list_files(&self) -> Result<Vec<FileMetadata>, ApiError>;

    async fn list_kb_files(&self, path: &str) -> Result<KbFilesListing, ApiError>;

    async fn list_kb_dirs(&self, path: &str) -> Result<KbDirListing, ApiError>;

    /// Stored queries, optionally filtered to one log file.
    async fn fetch_history(&self, _filename: Option<&str>) -> Result<Vec<HistoryEntry>, ApiError> {
        Err(ApiError::Unsupported("fetch_history"))
    }

    /// Distinct fault/alarm codes found in a log.
    async fn list_faults(&self, _filename: &str) -> Result<Vec<String>, ApiError> {
        Err(ApiError::Unsupported("list_faults"))
    }

    /// Add a reference document to the default knowledge base.
    async fn upload_kb_document(
        &self,
        _filename: &str,
        _contents: Vec<u8>,
    ) -> Result<UploadResponse, ApiError> {
        Err(ApiError::Unsupported("upload_kb_document"))
    }

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    /// 200 response that reports a failure in its body
    #[error("Backend reported: {0}")]
    Backend(String),

    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    #[error("All {attempts} attempts failed: {last}")]
    RetryExhausted { attempts: usize, last: Box<ApiError> },
}

impl ApiError {
    /// Worth retrying: connection trouble, timeouts, 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ApiError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub filename: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub top_k: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub structured: RawDiagnosis,
    /// Retrieved context documents
    #[serde(default)]
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub query: String,
    /// Serialized structured result being rated
    pub response: String,
    pub rating: FeedbackRating,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySaveRequest {
    pub filename: String,
    pub query: String,
    pub result: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
struct KbProcessRequest<'a> {
    path: &'a str,
}

/// Documents detected under a knowledge-base path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KbFilesListing {
    #[serde(default)]
    pub files: Vec<KbFileMetadata>,
    /// "connected" / "disconnected"
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub abs_path: Option<String>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Immediate subdirectories of a knowledge-base path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KbDirListing {
    #[serde(default)]
    pub dirs: Vec<String>,
    #[serde(default)]
    pub current_path: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PreviewEnvelope {
    #[serde(default)]
    preview: PreviewTable,
}

#[derive(Debug, Deserialize)]
struct FilesEnvelope {
    #[serde(default)]
    files: Vec<FileMetadata>,
}

#[derive(Debug, Deserialize)]
struct HistoryEnvelope {
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
struct FaultsEnvelope {
    #[serde(default)]
    faults: Vec<String>,
}

/// FastAPI-style error body: `{"detail": "..."}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

// ============================================================================
// HttpDiagnosisClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpDiagnosisClient {
    client: Client,
    config: ApiConfig,
    base_url: Url,
}

impl HttpDiagnosisClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let base_url = config.base_url.clone();
        Self::with_base_url(config, base_url)
    }

    /// Client for the `[api]` section of a loaded configuration.
    pub fn from_config(config: &FaultscopeConfig) -> Result<Self, FaultscopeError> {
        Ok(Self::new(config.api.clone())?)
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(config: ApiConfig, base_url: String) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// `base_url` + `/api/<segments...>`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    async fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|e| e.detail)
            .map(|detail| match detail {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .unwrap_or(body);

        tracing::error!(code = status.as_u16(), message = %message, "Diagnosis API error");

        Err(ApiError::Api {
            code: status.as_u16(),
            message,
        })
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let response = self.client.get(url).query(query).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// GET with retry on transient failures.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms.max(1))
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.config.max_retries);

        RetryIf::start(
            retry_strategy,
            || self.get_once(url.clone(), query),
            |e: &ApiError| e.is_transient(),
        )
        .await
        .map_err(|e| {
            if e.is_transient() && self.config.max_retries > 0 {
                tracing::error!(
                    attempts = self.config.max_retries + 1,
                    error = %e,
                    "All diagnosis API retry attempts failed"
                );
                ApiError::RetryExhausted {
                    attempts: self.config.max_retries + 1,
                    last: Box::new(e),
                }
            } else {
                e
            }
        })
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self.client.post(url).json(body).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_file(&self, url: Url, filename: &str, contents: Vec<u8>) -> Result<UploadResponse, ApiError> {
        let part = Part::bytes(contents).file_name(filename.to_string());
        let form = Form::new().part("file", part);
        let response = self.client.post(url).multipart(form).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[async_trait]
impl DiagnosisApi for HttpDiagnosisClient {
    async fn upload_log(&self, filename: &str, contents: Vec<u8>) -> Result<UploadResponse, ApiError> {
        let url = self.endpoint(&["upload"])?;
        self.post_file(url, filename, contents).await
    }

    async fn preview(&self, filename: &str) -> Result<PreviewTable, ApiError> {
        let url = self.endpoint(&["preview", filename])?;
        let envelope: PreviewEnvelope = self.get_json(url, &[]).await?;
        Ok(envelope.preview)
    }

    async fn process_log(&self, filename: &str) -> Result<ProcessResponse, ApiError> {
        let url = self.endpoint(&["process"])?;
        let response = self
            .client
            .post(url)
            .query(&[("filename", filename)])
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn process_knowledge_base(&self, path: &str) -> Result<ProcessResponse, ApiError> {
        let url = self.endpoint(&["kb", "process"])?;
        self.post_json(url, &KbProcessRequest { path }).await
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, ApiError> {
        let url = self.endpoint(&["query"])?;
        self.post_json(url, request).await
    }

    async fn submit_feedback(&self, request: &FeedbackRequest) -> Result<(), ApiError> {
        let url = self.endpoint(&["feedback"])?;
        let _: serde_json::Value = self.post_json(url, request).await?;
        Ok(())
    }

    async fn save_history(&self, request: &HistorySaveRequest) -> Result<(), ApiError> {
        let url = self.endpoint(&["history", "save"])?;
        let _: serde_json::Value = self.post_json(url, request).await?;
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<FileMetadata>, ApiError> {
        let url = self.endpoint(&["files"])?;
        let envelope: FilesEnvelope = self.get_json(url, &[]).await?;
        Ok(envelope.files)
    }

    async fn list_kb_files(&self, path: &str) -> Result<KbFilesListing, ApiError> {
        let url = self.endpoint(&["kb", "files"])?;
        let listing: KbFilesListing = self.get_json(url, &[("path", path)]).await?;
        match listing.error {
            Some(error) => Err(ApiError::Backend(error)),
            None => Ok(listing),
        }
    }

    async fn list_kb_dirs(&self, path: &str) -> Result<KbDirListing, ApiError> {
        let url = self.endpoint(&["kb", "ls"])?;
        let listing: KbDirListing = self.get_json(url, &[("path", path)]).await?;
        match listing.error {
            Some(error) => Err(ApiError::Backend(error)),
            None => Ok(listing),
        }
    }

    async fn fetch_history(&self, filename: Option<&str>) -> Result<Vec<HistoryEntry>, ApiError> {
        let url = self.endpoint(&["history"])?;
        let query: Vec<(&str, &str)> = filename.map(|f| ("filename", f)).into_iter().collect();
        let envelope: HistoryEnvelope = self.get_json(url, &query).await?;
        Ok(envelope.history)
    }

    async fn list_faults(&self, filename: &str) -> Result<Vec<String>, ApiError> {
        let url = self.endpoint(&["faults", filename])?;
        let envelope: FaultsEnvelope = self.get_json(url, &[]).await?;
        Ok(envelope.faults)
    }

    async fn upload_kb_document(&self, filename: &str, contents: Vec<u8>) -> Result<UploadResponse, ApiError> {
        let url = self.endpoint(&["kb", "upload"])?;
        self.post_file(url, filename, contents).await
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(max_retries: usize) -> ApiConfig {
        ApiConfig {
            base_url: String::new(),
            timeout_seconds: 5,
            max_retries,
            retry_delay_ms: 10,
        }
    }

    fn client_for(server: &MockServer, max_retries: usize) -> HttpDiagnosisClient {
        HttpDiagnosisClient::with_base_url(test_config(max_retries), server.uri())
            .expect("Failed to create client")
    }

    #[tokio::test]
    async fn test_query_sends_top_k_and_decodes_structured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .and(body_json(serde_json::json!({ "query": "E102 Vacuum loss", "top_k": 3 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": "E102 Vacuum loss",
                "structured": {
                    "summary": "Vacuum loss on pick head",
                    "evidence": "Log row 14",
                    "root_cause": "Cracked hose",
                    "actions": "1. Replace hose",
                    "confidence": "High"
                },
                "evidence": ["Fault Code: E102. Description: Vacuum loss."]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 0);
        let response = client
            .query(&QueryRequest {
                query: "E102 Vacuum loss".to_string(),
                top_k: 3,
            })
            .await
            .expect("query should succeed");

        assert_eq!(response.evidence.len(), 1);
        assert_eq!(response.structured.summary, serde_json::json!("Vacuum loss on pick head"));
    }

    #[tokio::test]
    async fn test_preview_encodes_filename_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/preview/line%203.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "preview": [["code", "desc"], ["E102", "Vacuum loss"]]
            })))
            .mount(&server)
            .await;

        let preview = client_for(&server, 0).preview("line 3.csv").await.unwrap();
        assert_eq!(preview.len(), 2);
        assert_eq!(preview.row(1).unwrap(), &["E102", "Vacuum loss"]);
    }

    #[tokio::test]
    async fn test_process_log_passes_filename_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/process"))
            .and(query_param("filename", "log1.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "Processed 42 log entries", "count": 42
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ack = client_for(&server, 0).process_log("log1.csv").await.unwrap();
        assert_eq!(ack.count, Some(42));
    }

    #[tokio::test]
    async fn test_error_detail_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/preview/missing.csv"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({ "detail": "File not found" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server, 3).preview("missing.csv").await.unwrap_err();
        match err {
            ApiError::Api { code, message } => {
                assert_eq!(code, 404);
                assert_eq!(message, "File not found");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reads_retry_on_503_then_succeed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/files"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [
                    { "filename": "log1.csv", "upload_timestamp": "2026-01-12T08:30:00.123456", "size": 2048 },
                    { "filename": "legacy.csv", "upload_timestamp": null, "size": null }
                ]
            })))
            .mount(&server)
            .await;

        let files = client_for(&server, 2).list_files().await.expect("retry should recover");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].size_bytes, Some(2048));
        assert!(files[0].uploaded_at.is_some());
        assert!(files[1].uploaded_at.is_none());
    }

    #[tokio::test]
    async fn test_reads_give_up_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/files"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(3)
            .mount(&server)
            .await;

        match client_for(&server, 2).list_files().await {
            Err(ApiError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, ApiError::Api { code: 500, .. }));
            }
            other => panic!("Expected RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_writes_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/feedback"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let request = FeedbackRequest {
            query: "q".to_string(),
            response: "{}".to_string(),
            rating: FeedbackRating::Good,
        };
        assert!(client_for(&server, 3).submit_feedback(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_kb_listing_soft_error_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/kb/ls"))
            .and(query_param("path", "manuals/missing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "dirs": [], "error": "Path not found"
            })))
            .mount(&server)
            .await;

        match client_for(&server, 0).list_kb_dirs("manuals/missing").await {
            Err(ApiError::Backend(message)) => assert_eq!(message, "Path not found"),
            other => panic!("Expected Backend error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_kb_files_listing_decodes_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/kb/files"))
            .and(query_param("path", "data/knowledge_base"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{ "filename": "drive_manual.pdf", "size": 10240 }],
                "status": "connected",
                "abs_path": "/app/data/knowledge_base",
                "count": 1
            })))
            .mount(&server)
            .await;

        let listing = client_for(&server, 0)
            .list_kb_files("data/knowledge_base")
            .await
            .unwrap();
        assert_eq!(listing.files[0].filename, "drive_manual.pdf");
        assert_eq!(listing.status.as_deref(), Some("connected"));
    }

    #[tokio::test]
    async fn test_upload_adopts_server_filename() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "File uploaded successfully", "filename": "log1_1.csv"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ack = client_for(&server, 0)
            .upload_log("log1.csv", b"code,desc\nE102,Vacuum loss\n".to_vec())
            .await
            .unwrap();
        assert_eq!(ack.filename, "log1_1.csv");
    }

    #[tokio::test]
    async fn test_history_filter_is_optional() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/history"))
            .and(query_param("filename", "log1.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "history": [{
                    "filename": "log1.csv",
                    "timestamp": "2026-01-12T08:31:00",
                    "query": "E102 Vacuum loss",
                    "result": { "summary": "Vacuum loss" }
                }]
            })))
            .mount(&server)
            .await;

        let history = client_for(&server, 0).fetch_history(Some("log1.csv")).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query, "E102 Vacuum loss");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = HttpDiagnosisClient::with_base_url(test_config(0), "not a url".to_string());
        assert!(matches!(result, Err(ApiError::InvalidUrl(_))));
    }

    #[test]
    fn test_from_config_reports_api_error() {
        let mut config = FaultscopeConfig::default();
        config.api.base_url = "plc gateway".to_string();
        let result = HttpDiagnosisClient::from_config(&config);
        assert!(matches!(
            result,
            Err(FaultscopeError::Api(ApiError::InvalidUrl(_)))
        ));

        config.api.base_url = "http://plc-gw:9000/".to_string();
        assert!(HttpDiagnosisClient::from_config(&config).is_ok());
    }

    #[test]
    fn test_endpoint_keeps_base_path_prefix() {
        let client =
            HttpDiagnosisClient::with_base_url(test_config(0), "http://gateway:8080/plc/".to_string()).unwrap();
        let url = client.endpoint(&["kb", "ls"]).unwrap();
        assert_eq!(url.as_str(), "http://gateway:8080/plc/api/kb/ls");
    }
}

//! HTTP side of the mediaflow ingestion pipeline.
//!
//! [`ApiClient`] talks to the application server; the caller's identity is an
//! explicit [`Session`] passed into every call rather than ambient state. On top
//! of it sit the pipeline stages:
//!
//! - [`broker::UploadCredentialBroker`] issues per-kind upload descriptors
//! - [`upload::DirectUploadExecutor`] streams bytes straight to storage
//! - [`conversion::ConversionTrigger`] asks the server to transcode an upload
//! - [`poller::ConversionStatusPoller`] watches the job until it settles
//! - [`pipeline::IngestPipeline`] runs them in order for one asset

pub mod broker;
pub mod conversion;
pub mod events;
pub mod pipeline;
pub mod poller;
pub mod progress;
pub mod upload;

use mediaflow_core::{ClientConfig, PipelineError, PipelineResult};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use uuid::Uuid;

/// Longest server error body carried into an error message
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Correlation id sent with every application-server request
const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Caller identity attached to every application-server request.
#[derive(Clone, PartialEq, Eq)]
pub enum Session {
    /// `Authorization: Bearer {token}`
    Bearer(String),
    /// `X-API-Key: {key}`
    ApiKey(String),
    Anonymous,
}

impl Session {
    /// Bearer token wins over an API key when both are configured.
    pub fn from_config(config: &ClientConfig) -> Self {
        match (&config.token, &config.api_key) {
            (Some(token), _) => Session::Bearer(token.clone()),
            (None, Some(key)) => Session::ApiKey(key.clone()),
            (None, None) => Session::Anonymous,
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Session::Bearer(token) => request.header("Authorization", format!("Bearer {}", token)),
            Session::ApiKey(key) => request.header("X-API-Key", key.as_str()),
            Session::Anonymous => request,
        }
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Session::Bearer(_) => write!(f, "Session::Bearer(***)"),
            Session::ApiKey(_) => write!(f, "Session::ApiKey(***)"),
            Session::Anonymous => write!(f, "Session::Anonymous"),
        }
    }
}

/// Why an API call did not produce a value. Each stage maps `Status` into its
/// own taxonomy entry.
#[derive(Debug)]
pub(crate) enum ApiFailure {
    Status { status: u16, message: String },
    Transport(String),
    Decode(String),
}

impl ApiFailure {
    pub(crate) fn into_error(
        self,
        on_status: impl FnOnce(u16, String) -> PipelineError,
    ) -> PipelineError {
        match self {
            ApiFailure::Status { status, message } => on_status(status, message),
            ApiFailure::Transport(msg) => PipelineError::Transport(msg),
            ApiFailure::Decode(msg) => PipelineError::Decode(msg),
        }
    }
}

/// Pull a human-readable reason out of an error body. JSON bodies with a
/// `message` or `error` field use that field; anything else is used as-is.
pub(crate) fn extract_message(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"]
                .iter()
                .find_map(|field| value.get(field).and_then(|v| v.as_str()).map(str::to_string))
        });
    let message = from_json.unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        return "no details provided".to_string();
    }
    message.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// HTTP client for the application server.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_prefix: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_prefix: config.api_prefix(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for a path below the API prefix, e.g. `/conversions`
    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.api_prefix, path)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        session: &Session,
        path: &str,
    ) -> Result<T, ApiFailure> {
        let request = session.apply(self.client.get(self.build_url(path)));
        Self::send(request, "GET", path).await
    }

    pub(crate) async fn post_json<T: DeserializeOwned, B: serde::Serialize + ?Sized>(
        &self,
        session: &Session,
        path: &str,
        body: &B,
    ) -> Result<T, ApiFailure> {
        let request = session.apply(self.client.post(self.build_url(path)).json(body));
        Self::send(request, "POST", path).await
    }

    async fn send<T: DeserializeOwned>(
        request: RequestBuilder,
        method: &str,
        path: &str,
    ) -> Result<T, ApiFailure> {
        let request_id = Uuid::new_v4();
        tracing::debug!(%request_id, method, path, "API request");
        let response = request
            .header(REQUEST_ID_HEADER, request_id.to_string())
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%request_id, status = status.as_u16(), "API request failed");
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiFailure::Status {
                status: status.as_u16(),
                message: extract_message(&error_text),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ApiFailure::Decode(format!("Failed to parse response as JSON: {}", e)))
    }
}

pub use broker::{CredentialBroker, UploadCredentialBroker};
pub use conversion::{ConversionApi, ConversionTrigger};
pub use events::{EventListener, NoopListener, PipelineEvent, TracingListener};
pub use pipeline::{
    AssetUpload, CompletedWork, IngestError, IngestOutcome, IngestPipeline, SourceFile,
};
pub use poller::{ConversionStatusPoller, PollOutcome, StatusSource};
pub use progress::{ProgressBoard, ProgressCell};
pub use upload::DirectUploadExecutor;

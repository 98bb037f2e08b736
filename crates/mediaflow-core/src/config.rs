//! Configuration module
//!
//! Client configuration read from the environment (and `.env` through dotenvy).
//! Values are read once and passed explicitly into the components that need
//! them.

use std::env;
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};
use crate::retry::{RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_RETRIES};

const API_URL: &str = "http://localhost:3000";
const API_VERSION: &str = "v0";
const HTTP_TIMEOUT_SECS: u64 = 60;
const UPLOAD_TIMEOUT_SECS: u64 = 900;
const UPLOAD_CHUNK_BYTES: usize = 256 * 1024;
const POLL_INTERVAL_MS: u64 = 3000;
const POLL_MAX_ATTEMPTS: u32 = 100;
const MAX_TRIM_SECS: f64 = 60.0;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_version: String,
    /// Sent as `X-API-Key`
    pub api_key: Option<String>,
    /// Sent as `Authorization: Bearer`; wins over `api_key` when both are set
    pub token: Option<String>,
    pub http_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    /// Bytes per streamed body chunk, and so the granularity of progress events
    pub upload_chunk_bytes: usize,
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    /// Default maximum length of a trimmed sample, in seconds
    pub max_trim_secs: f64,
    pub upload_max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: API_URL.to_string(),
            api_version: API_VERSION.to_string(),
            api_key: None,
            token: None,
            http_timeout_secs: HTTP_TIMEOUT_SECS,
            upload_timeout_secs: UPLOAD_TIMEOUT_SECS,
            upload_chunk_bytes: UPLOAD_CHUNK_BYTES,
            poll_interval_ms: POLL_INTERVAL_MS,
            poll_max_attempts: POLL_MAX_ATTEMPTS,
            max_trim_secs: MAX_TRIM_SECS,
            upload_max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl ClientConfig {
    pub fn from_env() -> PipelineResult<Self> {
        dotenvy::dotenv().ok();

        let config = ClientConfig {
            api_url: env::var("MEDIAFLOW_API_URL")
                .or_else(|_| env::var("API_URL"))
                .unwrap_or_else(|_| API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_version: env::var("MEDIAFLOW_API_VERSION")
                .unwrap_or_else(|_| API_VERSION.to_string()),
            api_key: env::var("MEDIAFLOW_API_KEY").ok().filter(|s| !s.is_empty()),
            token: env::var("MEDIAFLOW_TOKEN").ok().filter(|s| !s.is_empty()),
            http_timeout_secs: parse_or("MEDIAFLOW_HTTP_TIMEOUT_SECS", HTTP_TIMEOUT_SECS),
            upload_timeout_secs: parse_or("MEDIAFLOW_UPLOAD_TIMEOUT_SECS", UPLOAD_TIMEOUT_SECS),
            upload_chunk_bytes: parse_or("MEDIAFLOW_UPLOAD_CHUNK_BYTES", UPLOAD_CHUNK_BYTES),
            poll_interval_ms: parse_or("MEDIAFLOW_POLL_INTERVAL_MS", POLL_INTERVAL_MS),
            poll_max_attempts: parse_or("MEDIAFLOW_POLL_MAX_ATTEMPTS", POLL_MAX_ATTEMPTS),
            max_trim_secs: parse_or("MEDIAFLOW_MAX_TRIM_SECS", MAX_TRIM_SECS),
            upload_max_retries: parse_or("MEDIAFLOW_UPLOAD_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            retry_base_delay_ms: parse_or("MEDIAFLOW_RETRY_BASE_DELAY_MS", DEFAULT_BASE_DELAY_MS),
            retry_max_delay_ms: parse_or("MEDIAFLOW_RETRY_MAX_DELAY_MS", DEFAULT_MAX_DELAY_MS),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(PipelineError::Config(format!(
                "MEDIAFLOW_API_URL must be an http(s) URL, got {}",
                self.api_url
            )));
        }
        if self.api_version.trim().is_empty() {
            return Err(PipelineError::Config(
                "MEDIAFLOW_API_VERSION cannot be empty".to_string(),
            ));
        }
        if self.upload_chunk_bytes == 0 {
            return Err(PipelineError::Config(
                "MEDIAFLOW_UPLOAD_CHUNK_BYTES must be greater than 0".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(PipelineError::Config(
                "MEDIAFLOW_POLL_INTERVAL_MS must be greater than 0".to_string(),
            ));
        }
        if self.poll_max_attempts == 0 {
            return Err(PipelineError::Config(
                "MEDIAFLOW_POLL_MAX_ATTEMPTS must be greater than 0".to_string(),
            ));
        }
        if !self.max_trim_secs.is_finite() || self.max_trim_secs <= 0.0 {
            return Err(PipelineError::Config(
                "MEDIAFLOW_MAX_TRIM_SECS must be a positive number".to_string(),
            ));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(PipelineError::Config(
                "MEDIAFLOW_RETRY_BASE_DELAY_MS cannot exceed MEDIAFLOW_RETRY_MAX_DELAY_MS"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// API path prefix, e.g. `/api/v0`
    pub fn api_prefix(&self) -> String {
        format!("/api/{}", self.api_version)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.upload_max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }
}

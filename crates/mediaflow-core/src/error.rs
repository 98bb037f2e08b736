//! Error types module
//!
//! Every failure the ingestion pipeline can surface is a `PipelineError`. The
//! first five variants are the user-facing taxonomy (credential, upload,
//! validation, conversion request, polling exhausted); the rest are plumbing
//! failures that callers still need to turn into a message.
//!
//! Validation errors are produced and resolved on the client. Everything else
//! is caught at its call site and rendered through [`ErrorMetadata::client_message`].

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable or soft failures
    Warn,
    /// Error level - for terminal failures
    Error,
}

/// Metadata describing how an error should be presented to the user.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "CREDENTIAL_REJECTED")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same step can succeed
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the user
    fn suggested_action(&self) -> Option<&'static str>;

    /// Human-readable message for the toast/message layer
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Result type used across the pipeline
pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The broker rejected the whole descriptor request. No partial map exists.
    #[error("Credential request rejected: {message}")]
    Credential {
        status: Option<u16>,
        message: String,
    },

    /// Direct upload failed. `retryable` is derived from the status class.
    #[error("Upload failed ({}): {message}", status_label(.status))]
    Upload {
        status: Option<u16>,
        retryable: bool,
        message: String,
    },

    /// Trim bounds or file constraints violated. Never leaves the client.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The server refused to enqueue a conversion job.
    #[error("Conversion request rejected: {message}")]
    ConversionRequest {
        status: Option<u16>,
        message: String,
    },

    /// Poll budget spent without a terminal signal. Not proof of failure.
    #[error("Still processing after {attempts} status checks")]
    PollingExhausted { attempts: u32 },

    /// Network failure on an API call outside the upload path
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a body we could not interpret
    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller stopped the operation
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "no response".to_string(),
    }
}

impl PipelineError {
    /// Upload failure built from an HTTP status. 400 and 403 mean the
    /// descriptor is invalid or expired; 5xx is transient.
    pub fn upload_status(status: u16, message: impl Into<String>) -> Self {
        PipelineError::Upload {
            status: Some(status),
            retryable: is_retryable_upload_status(status),
            message: message.into(),
        }
    }

    /// Upload failure with no HTTP response (connect/reset/timeout).
    pub fn upload_network(message: impl Into<String>) -> Self {
        PipelineError::Upload {
            status: None,
            retryable: true,
            message: message.into(),
        }
    }

    /// True for upload errors whose descriptor must be re-issued before retrying.
    pub fn needs_new_descriptor(&self) -> bool {
        matches!(
            self,
            PipelineError::Upload {
                retryable: false,
                ..
            }
        )
    }

    /// True for upload errors the caller may retry with the same descriptor.
    pub fn is_retryable_upload(&self) -> bool {
        matches!(
            self,
            PipelineError::Upload {
                retryable: true,
                ..
            }
        )
    }

    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &'static str {
        match self {
            PipelineError::Credential { .. } => "CredentialError",
            PipelineError::Upload { .. } => "UploadError",
            PipelineError::Validation(_) => "ValidationError",
            PipelineError::ConversionRequest { .. } => "ConversionRequestError",
            PipelineError::PollingExhausted { .. } => "PollingExhausted",
            PipelineError::Transport(_) => "TransportError",
            PipelineError::Decode(_) => "DecodeError",
            PipelineError::Config(_) => "ConfigError",
            PipelineError::Cancelled(_) => "Cancelled",
        }
    }
}

/// Network failures and 5xx are transient. Everything else in 4xx means the
/// descriptor (or the request it describes) will not work again.
pub fn is_retryable_upload_status(status: u16) -> bool {
    (500..600).contains(&status) || status == 408 || status == 429
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Decode(format!("JSON parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for PipelineError {
    fn from(err: validator::ValidationErrors) -> Self {
        PipelineError::Validation(err.to_string())
    }
}

/// Static metadata for each variant: (error_code, recoverable, suggested_action, log_level).
fn static_metadata(err: &PipelineError) -> (&'static str, bool, Option<&'static str>, LogLevel) {
    match err {
        PipelineError::Credential { .. } => (
            "CREDENTIAL_REJECTED",
            false,
            Some("Check the selected files and sign in again if your session expired"),
            LogLevel::Error,
        ),
        PipelineError::Upload {
            retryable: true, ..
        } => (
            "UPLOAD_FAILED",
            true,
            Some("Check your connection and retry the upload"),
            LogLevel::Warn,
        ),
        PipelineError::Upload {
            retryable: false, ..
        } => (
            "UPLOAD_REJECTED",
            false,
            Some("Request a new upload slot and upload again"),
            LogLevel::Error,
        ),
        PipelineError::Validation(_) => (
            "VALIDATION_ERROR",
            false,
            Some("Correct the selection and try again"),
            LogLevel::Debug,
        ),
        PipelineError::ConversionRequest { .. } => (
            "CONVERSION_REJECTED",
            false,
            Some("Wait for the current conversion to finish before starting another"),
            LogLevel::Error,
        ),
        PipelineError::PollingExhausted { .. } => (
            "STILL_PROCESSING",
            true,
            Some("Check back later"),
            LogLevel::Warn,
        ),
        PipelineError::Transport(_) => (
            "TRANSPORT_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Warn,
        ),
        PipelineError::Decode(_) => (
            "MALFORMED_RESPONSE",
            false,
            Some("Contact support if this error persists"),
            LogLevel::Error,
        ),
        PipelineError::Config(_) => (
            "CONFIG_ERROR",
            false,
            Some("Check the client configuration"),
            LogLevel::Error,
        ),
        PipelineError::Cancelled(_) => ("CANCELLED", true, None, LogLevel::Debug),
    }
}

impl ErrorMetadata for PipelineError {
    fn error_code(&self) -> &'static str {
        static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        static_metadata(self).1
    }

    fn suggested_action(&self) -> Option<&'static str> {
        static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            PipelineError::Credential { message, .. } => {
                format!("Could not prepare the upload: {}", message)
            }
            PipelineError::Upload {
                retryable: true, ..
            } => "The upload was interrupted".to_string(),
            PipelineError::Upload {
                retryable: false, ..
            } => "The upload link is no longer valid".to_string(),
            PipelineError::Validation(msg) => msg.clone(),
            PipelineError::ConversionRequest { message, .. } => {
                format!("Could not start processing: {}", message)
            }
            PipelineError::PollingExhausted { .. } => {
                "Your video is still processing. Check back later.".to_string()
            }
            PipelineError::Transport(_) => "Could not reach the server".to_string(),
            PipelineError::Decode(_) => "Unexpected response from the server".to_string(),
            PipelineError::Config(msg) => msg.clone(),
            PipelineError::Cancelled(_) => "Cancelled".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_status_classification() {
        for status in [400u16, 403] {
            let err = PipelineError::upload_status(status, "denied");
            assert!(err.needs_new_descriptor());
            assert!(!err.is_retryable_upload());
            assert_eq!(err.error_code(), "UPLOAD_REJECTED");
        }

        for status in [500u16, 502, 503] {
            let err = PipelineError::upload_status(status, "bad gateway");
            assert!(err.is_retryable_upload());
            assert!(!err.needs_new_descriptor());
            assert_eq!(err.log_level(), LogLevel::Warn);
        }

        let err = PipelineError::upload_network("connection reset");
        assert!(err.is_retryable_upload());
        assert!(err.to_string().contains("no response"));
    }

    #[test]
    fn test_polling_exhausted_is_soft() {
        let err = PipelineError::PollingExhausted { attempts: 40 };
        assert!(err.is_recoverable());
        assert_eq!(err.error_code(), "STILL_PROCESSING");
        assert!(err.client_message().contains("still processing"));
        assert_eq!(err.log_level(), LogLevel::Warn);
    }

    #[test]
    fn test_validation_is_debug_level() {
        let err = PipelineError::Validation("end must be after start".to_string());
        assert_eq!(err.log_level(), LogLevel::Debug);
        assert_eq!(err.client_message(), "end must be after start");
        assert_eq!(err.error_type(), "ValidationError");
    }

    #[test]
    fn test_credential_message_carries_server_reason() {
        let err = PipelineError::Credential {
            status: Some(400),
            message: "duplicate kind: avatar".to_string(),
        };
        assert!(!err.is_recoverable());
        assert!(err.client_message().contains("duplicate kind"));
        assert_eq!(
            err.suggested_action(),
            Some("Check the selected files and sign in again if your session expired")
        );
    }
}

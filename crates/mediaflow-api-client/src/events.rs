//! Pipeline events and the listener interface.
//!
//! Stages report what happens through an [`EventListener`] instead of calling
//! into a UI directly. Events are serialisable so a CLI can print them as JSON
//! lines.

use mediaflow_core::{ConversionState, ErrorMetadata, FileKind, LogLevel, PipelineError};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    DescriptorsIssued {
        kinds: Vec<FileKind>,
    },
    UploadStarted {
        kind: FileKind,
        size_bytes: u64,
        attempt: u32,
    },
    UploadProgress {
        kind: FileKind,
        percent: u8,
    },
    UploadCompleted {
        kind: FileKind,
    },
    UploadFailed {
        kind: FileKind,
        code: &'static str,
        message: String,
        retryable: bool,
    },
    /// Partial progress was discarded after cancellation or failure
    UploadReset {
        kind: FileKind,
    },
    ConversionRequested {
        tmp_storage_key: String,
        need_trim: bool,
    },
    StatusChanged {
        asset_id: String,
        state: ConversionState,
        attempt: u32,
    },
    /// Poll budget spent while the job still reports it is converting
    StillProcessing {
        asset_id: String,
        attempts: u32,
    },
    PollingStopped {
        asset_id: String,
    },
}

impl PipelineEvent {
    pub fn upload_failed(kind: FileKind, err: &PipelineError) -> Self {
        PipelineEvent::UploadFailed {
            kind,
            code: err.error_code(),
            message: err.client_message(),
            retryable: err.is_retryable_upload(),
        }
    }
}

pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl EventListener for NoopListener {
    fn on_event(&self, _event: &PipelineEvent) {}
}

/// Logs events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl EventListener for TracingListener {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::UploadProgress { kind, percent } => {
                tracing::debug!(kind = %kind, percent = *percent, "Upload progress");
            }
            PipelineEvent::UploadFailed {
                kind,
                code,
                message,
                retryable,
            } => {
                tracing::warn!(
                    kind = %kind,
                    code = %code,
                    retryable = *retryable,
                    "Upload failed: {}",
                    message
                );
            }
            PipelineEvent::StillProcessing { asset_id, attempts } => {
                tracing::warn!(
                    asset_id = %asset_id,
                    attempts = *attempts,
                    "Conversion still running after poll budget"
                );
            }
            other => match serde_json::to_string(other) {
                Ok(json) => tracing::info!(event = %json, "Pipeline event"),
                Err(_) => tracing::info!(event = ?other, "Pipeline event"),
            },
        }
    }
}

/// Log a pipeline error at the level its metadata asks for.
pub(crate) fn log_error(err: &PipelineError, context: &str) {
    match err.log_level() {
        LogLevel::Debug => tracing::debug!(code = err.error_code(), "{}: {}", context, err),
        LogLevel::Warn => tracing::warn!(code = err.error_code(), "{}: {}", context, err),
        LogLevel::Error => tracing::error!(code = err.error_code(), "{}: {}", context, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_tagged() {
        let event = PipelineEvent::UploadProgress {
            kind: FileKind::MainVideo,
            percent: 42,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "event": "upload_progress", "kind": "main_video", "percent": 42 })
        );
    }

    #[test]
    fn test_upload_failed_carries_metadata() {
        let err = PipelineError::upload_status(403, "SignatureDoesNotMatch");
        match PipelineEvent::upload_failed(FileKind::Cover, &err) {
            PipelineEvent::UploadFailed {
                code, retryable, ..
            } => {
                assert_eq!(code, "UPLOAD_REJECTED");
                assert!(!retryable);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}

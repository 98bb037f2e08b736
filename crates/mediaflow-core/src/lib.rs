//! Mediaflow Core Library
//!
//! Domain models, error types, configuration and validation for the media
//! ingestion pipeline. Everything in this crate is network-free: the HTTP side
//! lives in `mediaflow-api-client` and drives the state machines defined here.

pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod tracker;
pub mod trim;
pub mod validation;

// Re-export commonly used types
pub use config::ClientConfig;
pub use error::{ErrorMetadata, LogLevel, PipelineError, PipelineResult};
pub use models::{
    ConversionAck, ConversionJob, ConversionRequest, ConversionState, ConversionStatus, FileKind,
    FileSpec, KindProgress, Orientation, TrimBounds, UploadDescriptor,
};
pub use retry::RetryPolicy;
pub use tracker::{ConversionTracker, Observation, RequiredOutputs};
pub use trim::{format_timestamp, DragOutcome, Handle, TrackGeometry, TrimRangeSelector, TrimState};

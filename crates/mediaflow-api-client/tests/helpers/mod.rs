#![allow(dead_code)]

use chrono::{Duration, Utc};
use mediaflow_api_client::{EventListener, PipelineEvent, Session};
use mediaflow_core::models::{UploadMethod, UploadTarget};
use mediaflow_core::{ClientConfig, FileKind, UploadDescriptor};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

pub const API_KEY: &str = "test-key";

/// Returns the versioned API path.
/// Usage: `api_path("/conversions")` -> `/api/v0/conversions`.
pub fn api_path(path: &str) -> String {
    format!("/api/v0{}", path)
}

/// Client configuration pointing at a mock server, with fast polling and
/// retries so tests do not sleep.
pub fn test_config(server_url: &str) -> ClientConfig {
    ClientConfig {
        api_url: server_url.to_string(),
        api_key: Some(API_KEY.to_string()),
        upload_chunk_bytes: 4,
        poll_interval_ms: 1,
        poll_max_attempts: 10,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 5,
        ..ClientConfig::default()
    }
}

pub fn session() -> Session {
    Session::ApiKey(API_KEY.to_string())
}

/// One entry of a descriptor response, uploading to `/storage/{object}`
pub fn descriptor_entry(server_url: &str, object: &str) -> Value {
    json!({
        "key": format!("tmp/{}", object),
        "upload_url": format!("{}/storage/{}", server_url, object),
        "required_headers": { "x-amz-acl": "private" },
        "expires_in": 300
    })
}

pub fn descriptor(kind: FileKind, server_url: &str, object: &str, ttl_secs: i64) -> UploadDescriptor {
    UploadDescriptor {
        kind,
        storage_key: format!("tmp/{}", object),
        upload_target: UploadTarget {
            url: format!("{}/storage/{}", server_url, object),
            method: UploadMethod::Put,
        },
        required_headers: BTreeMap::from([("x-amz-acl".to_string(), "private".to_string())]),
        expires_at: Utc::now() + Duration::seconds(ttl_secs),
    }
}

/// Listener that keeps every event for assertions
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Progress percentages reported for one kind, in order
    pub fn percents(&self, kind: FileKind) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PipelineEvent::UploadProgress { kind: k, percent } if k == kind => Some(percent),
                _ => None,
            })
            .collect()
    }
}

impl EventListener for RecordingListener {
    fn on_event(&self, event: &PipelineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

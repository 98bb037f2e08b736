use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use validator::Validate;

use super::FileKind;
use crate::error::{PipelineError, PipelineResult};

/// Seconds shaved off a descriptor's lifetime so an upload is not started on
/// a descriptor that expires in flight.
pub const EXPIRY_SKEW_SECS: i64 = 5;

/// One file in a descriptor request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FileSpec {
    pub kind: FileKind,
    /// Content type (MIME type)
    #[validate(length(
        min = 1,
        max = 255,
        message = "Content type must be between 1 and 255 characters"
    ))]
    pub content_type: String,
    /// File extension without the leading dot
    #[validate(length(
        min = 1,
        max = 16,
        message = "Extension must be between 1 and 16 characters"
    ))]
    pub ext: String,
}

impl FileSpec {
    pub fn new(kind: FileKind, content_type: impl Into<String>, ext: impl Into<String>) -> Self {
        Self {
            kind,
            content_type: content_type.into(),
            ext: ext.into().trim_start_matches('.').to_lowercase(),
        }
    }
}

/// Request body for `requestDescriptors`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorRequest {
    pub files: Vec<FileSpec>,
}

/// Per-kind entry of the descriptor response, as sent by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDescriptor {
    pub key: String,
    pub upload_url: String,
    #[serde(default)]
    pub required_headers: HashMap<String, String>,
    /// Lifetime in seconds, counted from the response
    pub expires_in: i64,
    /// HTTP method for the write; the server omits it for plain PUT uploads
    #[serde(default)]
    pub method: Option<String>,
}

/// Response body of `requestDescriptors`, keyed by wire kind name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorResponse {
    pub uploads: HashMap<String, RawDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadMethod {
    Put,
    Post,
}

impl UploadMethod {
    fn parse(method: Option<&str>) -> PipelineResult<Self> {
        match method.map(|m| m.to_uppercase()) {
            None => Ok(UploadMethod::Put),
            Some(m) if m == "PUT" => Ok(UploadMethod::Put),
            Some(m) if m == "POST" => Ok(UploadMethod::Post),
            Some(other) => Err(PipelineError::Decode(format!(
                "Unsupported upload method: {}",
                other
            ))),
        }
    }
}

/// Endpoint and method of a direct upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub url: String,
    pub method: UploadMethod,
}

/// Short-lived write credential for exactly one object.
///
/// Created per broker attempt and never persisted. Past `expires_at` it must be
/// re-issued; nothing refreshes it automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadDescriptor {
    pub kind: FileKind,
    pub storage_key: String,
    pub upload_target: UploadTarget,
    /// Forwarded verbatim on the upload request
    pub required_headers: BTreeMap<String, String>,
    pub expires_at: DateTime<Utc>,
}

impl UploadDescriptor {
    /// Build a descriptor from its wire form. `issued_at` is when the broker
    /// response was received.
    pub fn from_raw(
        kind: FileKind,
        raw: RawDescriptor,
        issued_at: DateTime<Utc>,
    ) -> PipelineResult<Self> {
        if raw.key.trim().is_empty() {
            return Err(PipelineError::Decode(format!(
                "Descriptor for {} has an empty storage key",
                kind
            )));
        }
        if !(raw.upload_url.starts_with("https://") || raw.upload_url.starts_with("http://")) {
            return Err(PipelineError::Decode(format!(
                "Descriptor for {} has an invalid upload URL",
                kind
            )));
        }
        if raw.expires_in <= 0 {
            return Err(PipelineError::Decode(format!(
                "Descriptor for {} is already expired (expires_in = {})",
                kind, raw.expires_in
            )));
        }

        Ok(Self {
            kind,
            storage_key: raw.key,
            upload_target: UploadTarget {
                url: raw.upload_url,
                method: UploadMethod::parse(raw.method.as_deref())?,
            },
            required_headers: raw.required_headers.into_iter().collect(),
            expires_at: issued_at + Duration::seconds(raw.expires_in),
        })
    }

    /// Expired descriptors are unusable. The skew margin applies.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Convert a full broker response into the per-kind map. All-or-nothing: any
/// unknown, missing or malformed entry fails the whole response.
pub fn descriptors_from_response(
    requested: &[FileSpec],
    response: DescriptorResponse,
    issued_at: DateTime<Utc>,
) -> PipelineResult<BTreeMap<FileKind, UploadDescriptor>> {
    let mut out = BTreeMap::new();
    for (name, raw) in response.uploads {
        let kind: FileKind = name.parse().map_err(PipelineError::Decode)?;
        if !requested.iter().any(|spec| spec.kind == kind) {
            return Err(PipelineError::Decode(format!(
                "Server issued a descriptor for unrequested kind {}",
                kind
            )));
        }
        out.insert(kind, UploadDescriptor::from_raw(kind, raw, issued_at)?);
    }

    if let Some(missing) = requested.iter().find(|spec| !out.contains_key(&spec.kind)) {
        return Err(PipelineError::Decode(format!(
            "No descriptor issued for {}",
            missing.kind
        )));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(expires_in: i64) -> RawDescriptor {
        RawDescriptor {
            key: "tmp/abc.mp4".to_string(),
            upload_url: "https://storage.example.com/tmp/abc.mp4?sig=1".to_string(),
            required_headers: HashMap::from([(
                "x-amz-acl".to_string(),
                "private".to_string(),
            )]),
            expires_in,
            method: None,
        }
    }

    #[test]
    fn test_descriptor_expiry_window() {
        let issued = Utc::now();
        let d = UploadDescriptor::from_raw(FileKind::MainVideo, raw(60), issued).unwrap();
        assert_eq!(d.expires_at, issued + Duration::seconds(60));
        assert_eq!(d.upload_target.method, UploadMethod::Put);
        assert!(!d.is_expired_at(issued));
        assert!(d.is_expired_at(issued + Duration::seconds(56)));
        assert!(d.is_expired_at(issued + Duration::seconds(120)));
    }

    #[test]
    fn test_descriptor_rejects_non_positive_lifetime() {
        let err = UploadDescriptor::from_raw(FileKind::Avatar, raw(0), Utc::now()).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn test_response_is_all_or_nothing() {
        let requested = vec![
            FileSpec::new(FileKind::Avatar, "image/png", "png"),
            FileSpec::new(FileKind::Cover, "image/jpeg", "jpg"),
        ];
        let response = DescriptorResponse {
            uploads: HashMap::from([("avatar".to_string(), raw(300))]),
        };
        let err = descriptors_from_response(&requested, response, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("cover"));
    }

    #[test]
    fn test_response_maps_every_requested_kind() {
        let requested = vec![
            FileSpec::new(FileKind::Avatar, "image/png", ".PNG"),
            FileSpec::new(FileKind::Cover, "image/jpeg", "jpg"),
        ];
        assert_eq!(requested[0].ext, "png");
        let response = DescriptorResponse {
            uploads: HashMap::from([
                ("avatar".to_string(), raw(300)),
                ("cover".to_string(), raw(300)),
            ]),
        };
        let map = descriptors_from_response(&requested, response, Utc::now()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(
            map[&FileKind::Avatar].required_headers.get("x-amz-acl"),
            Some(&"private".to_string())
        );
    }
}

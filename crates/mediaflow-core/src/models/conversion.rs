use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Orientation hint forwarded to the transcoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
}

impl Orientation {
    /// Derive from frame dimensions. Zero-sized frames have no orientation.
    pub fn from_dimensions(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(match width.cmp(&height) {
            std::cmp::Ordering::Greater => Orientation::Landscape,
            std::cmp::Ordering::Less => Orientation::Portrait,
            std::cmp::Ordering::Equal => Orientation::Square,
        })
    }
}

impl Display for Orientation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Orientation::Portrait => write!(f, "portrait"),
            Orientation::Landscape => write!(f, "landscape"),
            Orientation::Square => write!(f, "square"),
        }
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            "square" => Ok(Orientation::Square),
            _ => Err(format!("Invalid orientation: {}", s)),
        }
    }
}

/// Confirmed trim interval in seconds, full precision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimBounds {
    pub start_time: f64,
    pub end_time: f64,
}

impl TrimBounds {
    pub fn new(start_time: f64, end_time: f64) -> Self {
        Self {
            start_time,
            end_time,
        }
    }

    pub fn length(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Request body for `triggerConversion`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub tmp_storage_key: String,
    pub need_trim: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_orientation: Option<Orientation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_orientation: Option<Orientation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl ConversionRequest {
    pub fn new(tmp_storage_key: impl Into<String>) -> Self {
        Self {
            tmp_storage_key: tmp_storage_key.into(),
            need_trim: false,
            start_time: None,
            end_time: None,
            main_orientation: None,
            sample_orientation: None,
            content_type: None,
        }
    }

    pub fn with_trim(mut self, bounds: TrimBounds) -> Self {
        self.need_trim = true;
        self.start_time = Some(bounds.start_time);
        self.end_time = Some(bounds.end_time);
        self
    }

    pub fn with_orientations(
        mut self,
        main: Option<Orientation>,
        sample: Option<Orientation>,
    ) -> Self {
        self.main_orientation = main;
        self.sample_orientation = sample;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn trim_bounds(&self) -> Option<TrimBounds> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(TrimBounds::new(start, end)),
            _ => None,
        }
    }
}

/// Status values the server uses to refuse a conversion in a 2xx body
const REJECTED_STATUSES: &[&str] = &["error", "failed", "rejected", "conflict"];

/// Response body of `triggerConversion`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionAck {
    pub status: String,
    #[serde(default)]
    pub message: String,
    pub tmp_storage_key: String,
}

impl ConversionAck {
    pub fn is_accepted(&self) -> bool {
        let status = self.status.trim().to_lowercase();
        !REJECTED_STATUSES.contains(&status.as_str())
    }
}

/// Response body of `pollStatus`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStatus {
    pub is_converting: bool,
    #[serde(default)]
    pub main_video_exists: bool,
    #[serde(default)]
    pub sample_video_exists: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl ConversionStatus {
    pub fn converting() -> Self {
        Self {
            is_converting: true,
            main_video_exists: false,
            sample_video_exists: false,
            message: None,
        }
    }

    pub fn finished(main_video_exists: bool, sample_video_exists: bool) -> Self {
        Self {
            is_converting: false,
            main_video_exists,
            sample_video_exists,
            message: None,
        }
    }
}

/// Client-side view of a conversion job's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionState {
    Pending,
    Converting,
    Ready,
    Failed,
}

impl ConversionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversionState::Ready | ConversionState::Failed)
    }
}

impl Display for ConversionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ConversionState::Pending => write!(f, "pending"),
            ConversionState::Converting => write!(f, "converting"),
            ConversionState::Ready => write!(f, "ready"),
            ConversionState::Failed => write!(f, "failed"),
        }
    }
}

/// A triggered conversion. Owned by the server once created; the client only
/// observes it and has no way to delete it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionJob {
    /// Asset/post identifier used for status polling
    pub asset_id: String,
    pub tmp_storage_key: String,
    pub needs_trim: bool,
    pub trim: Option<TrimBounds>,
    pub main_orientation: Option<Orientation>,
    pub sample_orientation: Option<Orientation>,
    pub content_type: Option<String>,
}

impl ConversionJob {
    pub fn from_request(asset_id: impl Into<String>, request: &ConversionRequest) -> Self {
        Self {
            asset_id: asset_id.into(),
            tmp_storage_key: request.tmp_storage_key.clone(),
            needs_trim: request.need_trim,
            trim: request.trim_bounds(),
            main_orientation: request.main_orientation,
            sample_orientation: request.sample_orientation,
            content_type: request.content_type.clone(),
        }
    }
}

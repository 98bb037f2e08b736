use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Highest numbered image slot (`image_1` ..= `image_9`).
pub const MAX_IMAGE_SLOTS: u8 = 9;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const IMAGE_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "m4v"];
const VIDEO_CONTENT_TYPES: &[&str] = &["video/mp4", "video/quicktime", "video/webm", "video/x-m4v"];

/// Semantic bucket a file is uploaded into. Closed set; unique per file within
/// a single credential request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FileKind {
    Avatar,
    Cover,
    MainVideo,
    SampleVideo,
    /// Numbered gallery image, 1-based
    Image(u8),
}

/// Broad media family of a kind, used to pick the allowed type/extension set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFamily {
    Image,
    Video,
}

impl FileKind {
    pub fn family(&self) -> MediaFamily {
        match self {
            FileKind::MainVideo | FileKind::SampleVideo => MediaFamily::Video,
            FileKind::Avatar | FileKind::Cover | FileKind::Image(_) => MediaFamily::Image,
        }
    }

    pub fn is_video(&self) -> bool {
        self.family() == MediaFamily::Video
    }

    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self.family() {
            MediaFamily::Image => IMAGE_EXTENSIONS,
            MediaFamily::Video => VIDEO_EXTENSIONS,
        }
    }

    pub fn allowed_content_types(&self) -> &'static [&'static str] {
        match self.family() {
            MediaFamily::Image => IMAGE_CONTENT_TYPES,
            MediaFamily::Video => VIDEO_CONTENT_TYPES,
        }
    }

    /// Case-insensitive check of a content type against this kind's family.
    pub fn accepts_content_type(&self, content_type: &str) -> bool {
        let content_type = content_type.trim().to_lowercase();
        self.allowed_content_types()
            .iter()
            .any(|allowed| *allowed == content_type)
    }

    /// Case-insensitive check of a file extension (with or without leading dot).
    pub fn accepts_extension(&self, ext: &str) -> bool {
        let ext = ext.trim().trim_start_matches('.').to_lowercase();
        self.allowed_extensions().iter().any(|allowed| *allowed == ext)
    }

    /// Content type implied by an extension, if this kind allows it.
    pub fn content_type_for_extension(&self, ext: &str) -> Option<&'static str> {
        if !self.accepts_extension(ext) {
            return None;
        }
        let ext = ext.trim().trim_start_matches('.').to_lowercase();
        Some(match ext.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "mp4" => "video/mp4",
            "mov" => "video/quicktime",
            "webm" => "video/webm",
            "m4v" => "video/x-m4v",
            _ => return None,
        })
    }
}

impl Display for FileKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FileKind::Avatar => write!(f, "avatar"),
            FileKind::Cover => write!(f, "cover"),
            FileKind::MainVideo => write!(f, "main_video"),
            FileKind::SampleVideo => write!(f, "sample_video"),
            FileKind::Image(n) => write!(f, "image_{}", n),
        }
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "avatar" => Ok(FileKind::Avatar),
            "cover" => Ok(FileKind::Cover),
            "main_video" => Ok(FileKind::MainVideo),
            "sample_video" => Ok(FileKind::SampleVideo),
            other => {
                let slot = other
                    .strip_prefix("image_")
                    .and_then(|n| n.parse::<u8>().ok())
                    .ok_or_else(|| format!("Invalid file kind: {}", s))?;
                if slot == 0 || slot > MAX_IMAGE_SLOTS {
                    return Err(format!(
                        "Invalid image slot {}: must be between 1 and {}",
                        slot, MAX_IMAGE_SLOTS
                    ));
                }
                Ok(FileKind::Image(slot))
            }
        }
    }
}

impl TryFrom<String> for FileKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FileKind> for String {
    fn from(kind: FileKind) -> Self {
        kind.to_string()
    }
}

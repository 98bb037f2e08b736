use std::collections::HashSet;

use validator::Validate;

use crate::error::{PipelineError, PipelineResult};
use crate::models::FileSpec;

/// Check a descriptor request: non-empty, pairwise distinct kinds, and each
/// content type/extension allowed for its kind.
pub fn validate_file_specs(files: &[FileSpec]) -> PipelineResult<()> {
    if files.is_empty() {
        return Err(PipelineError::Validation(
            "At least one file is required".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(files.len());
    for spec in files {
        spec.validate()?;

        if !seen.insert(spec.kind) {
            return Err(PipelineError::Validation(format!(
                "Duplicate file kind: {}",
                spec.kind
            )));
        }

        if !spec.kind.accepts_content_type(&spec.content_type) {
            return Err(PipelineError::Validation(format!(
                "Content type {} is not allowed for {}. Allowed: {}",
                spec.content_type,
                spec.kind,
                spec.kind.allowed_content_types().join(", ")
            )));
        }

        if !spec.kind.accepts_extension(&spec.ext) {
            return Err(PipelineError::Validation(format!(
                "Extension .{} is not allowed for {}. Allowed: {}",
                spec.ext,
                spec.kind,
                spec.kind.allowed_extensions().join(", ")
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileKind;

    #[test]
    fn test_valid_mixed_request() {
        let files = vec![
            FileSpec::new(FileKind::Avatar, "image/png", "png"),
            FileSpec::new(FileKind::MainVideo, "video/mp4", "mp4"),
            FileSpec::new(FileKind::Image(1), "image/webp", "webp"),
        ];
        assert!(validate_file_specs(&files).is_ok());
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let files = vec![
            FileSpec::new(FileKind::Avatar, "image/png", "png"),
            FileSpec::new(FileKind::Avatar, "image/jpeg", "jpg"),
        ];
        let err = validate_file_specs(&files).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(ref m) if m.contains("Duplicate")));
    }

    #[test]
    fn test_video_kind_requires_video_type() {
        let files = vec![FileSpec::new(FileKind::MainVideo, "image/png", "mp4")];
        assert!(validate_file_specs(&files).is_err());

        let files = vec![FileSpec::new(FileKind::SampleVideo, "video/mp4", "png")];
        assert!(validate_file_specs(&files).is_err());
    }

    #[test]
    fn test_empty_and_blank_fields_rejected() {
        assert!(validate_file_specs(&[]).is_err());
        let files = vec![FileSpec::new(FileKind::Cover, "", "jpg")];
        assert!(matches!(
            validate_file_specs(&files),
            Err(PipelineError::Validation(_))
        ));
    }
}

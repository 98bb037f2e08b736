use crate::error::{PipelineError, PipelineResult};
use crate::models::ConversionRequest;
use crate::trim::validate_bounds;

/// What the client knows about the media when checking trim bounds. Unknown
/// limits are skipped; the server checks them anyway.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrimLimits {
    pub total_duration: Option<f64>,
    pub max_duration: Option<f64>,
}

impl TrimLimits {
    pub fn new(total_duration: f64, max_duration: f64) -> Self {
        Self {
            total_duration: Some(total_duration),
            max_duration: Some(max_duration),
        }
    }
}

/// Reject a conversion request that cannot be valid, before anything is sent.
pub fn validate_conversion_request(
    request: &ConversionRequest,
    limits: TrimLimits,
) -> PipelineResult<()> {
    if request.tmp_storage_key.trim().is_empty() {
        return Err(PipelineError::Validation(
            "Storage key of the uploaded file is required".to_string(),
        ));
    }

    if !request.need_trim {
        return Ok(());
    }

    let (start, end) = match (request.start_time, request.end_time) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            return Err(PipelineError::Validation(
                "Trimming requires both a start time and an end time".to_string(),
            ))
        }
    };

    validate_bounds(
        start,
        end,
        limits.total_duration.unwrap_or(f64::INFINITY),
        limits.max_duration.unwrap_or(f64::INFINITY),
    )
}

//! Trim range selection
//!
//! `TrimRangeSelector` holds a half-open `[start, end)` interval over a media
//! timeline while the user drags its two handles. Between accepted mutations
//! the selection always satisfies
//!
//! ```text
//! 0 <= start < end <= duration    and    end - start <= max_duration
//! ```
//!
//! Rejected candidates leave the selection untouched. Times are real-valued
//! seconds; only [`format_timestamp`] truncates, for display.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::models::TrimBounds;

/// Which handle is being dragged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handle {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimState {
    /// Duration not known yet
    Idle,
    Loaded,
    Dragging(Handle),
}

/// Result of feeding one candidate time to the selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOutcome {
    Accepted,
    /// Candidate broke an ordering/bounds rule; nothing changed
    Rejected,
    /// Candidate only broke the max-duration bound; nothing changed and the
    /// length-exceeded flag is raised
    LengthExceeded,
    /// No handle is being dragged
    Ignored,
}

/// Horizontal extent of the rendered track, in the pointer's coordinate space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackGeometry {
    pub left: f64,
    pub width: f64,
}

impl TrackGeometry {
    pub fn new(left: f64, width: f64) -> Self {
        Self { left, width }
    }

    /// `clamp(x - left, 0, width) / width * duration`
    pub fn time_at(&self, pointer_x: f64, duration: f64) -> f64 {
        if self.width <= 0.0 || !pointer_x.is_finite() {
            return 0.0;
        }
        let offset = (pointer_x - self.left).clamp(0.0, self.width);
        offset / self.width * duration
    }

    /// Inverse of [`time_at`](Self::time_at), for placing handles.
    pub fn position_of(&self, time: f64, duration: f64) -> f64 {
        if duration <= 0.0 {
            return self.left;
        }
        self.left + (time / duration).clamp(0.0, 1.0) * self.width
    }
}

/// Render seconds as `mm:ss`, truncating the fractional part. Minutes do not
/// wrap into hours.
pub fn format_timestamp(seconds: f64) -> String {
    let whole = if seconds.is_finite() && seconds > 0.0 {
        seconds.trunc() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", whole / 60, whole % 60)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Selection {
    start: f64,
    end: f64,
    total: f64,
}

#[derive(Debug, Clone)]
pub struct TrimRangeSelector {
    max_duration: f64,
    state: TrimState,
    selection: Option<Selection>,
    cursor: f64,
    length_exceeded: bool,
}

impl TrimRangeSelector {
    pub fn new(max_duration: f64) -> PipelineResult<Self> {
        if !max_duration.is_finite() || max_duration <= 0.0 {
            return Err(PipelineError::Validation(format!(
                "Maximum trim length must be a positive number of seconds, got {}",
                max_duration
            )));
        }
        Ok(Self {
            max_duration,
            state: TrimState::Idle,
            selection: None,
            cursor: 0.0,
            length_exceeded: false,
        })
    }

    /// Duration became known: `Idle -> Loaded` with `[0, min(duration, max))`.
    /// Loading again (a different file) starts over.
    pub fn load(&mut self, duration: f64) -> PipelineResult<()> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(PipelineError::Validation(format!(
                "Media duration must be a positive number of seconds, got {}",
                duration
            )));
        }
        self.selection = Some(Selection {
            start: 0.0,
            end: duration.min(self.max_duration),
            total: duration,
        });
        self.state = TrimState::Loaded;
        self.cursor = 0.0;
        self.length_exceeded = false;
        Ok(())
    }

    pub fn state(&self) -> TrimState {
        self.state
    }

    pub fn max_duration(&self) -> f64 {
        self.max_duration
    }

    pub fn start_time(&self) -> Option<f64> {
        self.selection.map(|s| s.start)
    }

    pub fn end_time(&self) -> Option<f64> {
        self.selection.map(|s| s.end)
    }

    pub fn total_duration(&self) -> Option<f64> {
        self.selection.map(|s| s.total)
    }

    pub fn selected_length(&self) -> Option<f64> {
        self.selection.map(|s| s.end - s.start)
    }

    /// Current selection as bounds, if a duration is loaded
    pub fn bounds(&self) -> Option<TrimBounds> {
        self.selection.map(|s| TrimBounds::new(s.start, s.end))
    }

    /// Playback cursor, in seconds
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Whether the last end candidate was rejected only for exceeding the
    /// maximum length. Cleared by the next accepted candidate.
    pub fn length_exceeded(&self) -> bool {
        self.length_exceeded
    }

    /// `Loaded -> Dragging(handle)`. Returns false if no duration is loaded.
    pub fn begin_drag(&mut self, handle: Handle) -> bool {
        match self.state {
            TrimState::Idle => false,
            TrimState::Loaded | TrimState::Dragging(_) => {
                self.state = TrimState::Dragging(handle);
                true
            }
        }
    }

    /// `Dragging -> Loaded`
    pub fn release(&mut self) {
        if let TrimState::Dragging(_) = self.state {
            self.state = TrimState::Loaded;
        }
    }

    /// Feed a pointer position for the handle being dragged.
    pub fn drag_to(&mut self, pointer_x: f64, track: &TrackGeometry) -> DragOutcome {
        let Some(selection) = self.selection else {
            return DragOutcome::Ignored;
        };
        let candidate = track.time_at(pointer_x, selection.total);
        self.drag_to_time(candidate)
    }

    /// Feed a candidate time for the handle being dragged.
    pub fn drag_to_time(&mut self, candidate: f64) -> DragOutcome {
        match self.state {
            TrimState::Dragging(Handle::Start) => self.propose_start(candidate),
            TrimState::Dragging(Handle::End) => self.propose_end(candidate),
            TrimState::Idle | TrimState::Loaded => DragOutcome::Ignored,
        }
    }

    fn propose_start(&mut self, candidate: f64) -> DragOutcome {
        let Some(selection) = self.selection.as_mut() else {
            return DragOutcome::Ignored;
        };
        if !candidate.is_finite() || candidate < 0.0 || candidate >= selection.end {
            return DragOutcome::Rejected;
        }
        // Moving start earlier can stretch the range past the maximum.
        if selection.end - candidate > self.max_duration {
            self.length_exceeded = true;
            return DragOutcome::LengthExceeded;
        }
        selection.start = candidate;
        self.cursor = candidate;
        self.length_exceeded = false;
        DragOutcome::Accepted
    }

    fn propose_end(&mut self, candidate: f64) -> DragOutcome {
        let Some(selection) = self.selection.as_mut() else {
            return DragOutcome::Ignored;
        };
        if !candidate.is_finite() || candidate <= selection.start || candidate > selection.total {
            return DragOutcome::Rejected;
        }
        if candidate - selection.start > self.max_duration {
            self.length_exceeded = true;
            return DragOutcome::LengthExceeded;
        }
        selection.end = candidate;
        if self.cursor > candidate {
            self.cursor = selection.start;
        }
        self.length_exceeded = false;
        DragOutcome::Accepted
    }

    /// Replace the whole selection at once (typed-in times). Either both
    /// bounds are accepted or nothing changes.
    pub fn select(&mut self, start: f64, end: f64) -> PipelineResult<()> {
        let selection = self.selection.as_mut().ok_or_else(|| {
            PipelineError::Validation("Media duration is not known yet".to_string())
        })?;
        validate_bounds(start, end, selection.total, self.max_duration)?;
        selection.start = start;
        selection.end = end;
        self.cursor = start;
        self.length_exceeded = false;
        Ok(())
    }

    /// Move the playback cursor, kept inside the selection.
    pub fn seek(&mut self, time: f64) {
        if let Some(selection) = self.selection {
            if time.is_finite() {
                self.cursor = time.clamp(selection.start, selection.end);
            }
        }
    }

    /// Advance preview playback; reaching the end loops back to the start.
    pub fn tick(&mut self, elapsed: f64) {
        if let Some(selection) = self.selection {
            if !elapsed.is_finite() || elapsed <= 0.0 {
                return;
            }
            let next = self.cursor + elapsed;
            self.cursor = if next >= selection.end {
                selection.start
            } else {
                next
            };
        }
    }

    /// Pixel positions of the start and end handles on `track`.
    pub fn handle_positions(&self, track: &TrackGeometry) -> Option<(f64, f64)> {
        self.selection.map(|s| {
            (
                track.position_of(s.start, s.total),
                track.position_of(s.end, s.total),
            )
        })
    }

    /// `(start, end)` rendered as `mm:ss`
    pub fn labels(&self) -> Option<(String, String)> {
        self.selection
            .map(|s| (format_timestamp(s.start), format_timestamp(s.end)))
    }

    /// Emit the selection on explicit user confirmation.
    pub fn confirm(self) -> PipelineResult<TrimBounds> {
        let selection = self.selection.ok_or_else(|| {
            PipelineError::Validation("Nothing to confirm: media duration is not known".to_string())
        })?;
        tracing::debug!(
            start_time = selection.start,
            end_time = selection.end,
            "Trim selection confirmed"
        );
        Ok(TrimBounds::new(selection.start, selection.end))
    }

    /// Discard the selection without emitting anything.
    pub fn cancel(self) {
        tracing::debug!("Trim selection cancelled");
    }
}

/// Check a trim interval against a media duration and maximum length.
pub fn validate_bounds(
    start: f64,
    end: f64,
    total_duration: f64,
    max_duration: f64,
) -> PipelineResult<()> {
    if !start.is_finite() || !end.is_finite() {
        return Err(PipelineError::Validation(
            "Trim times must be finite numbers".to_string(),
        ));
    }
    if start < 0.0 {
        return Err(PipelineError::Validation(
            "Trim start cannot be negative".to_string(),
        ));
    }
    if end <= start {
        return Err(PipelineError::Validation(
            "Trim end must be after trim start".to_string(),
        ));
    }
    if end > total_duration {
        return Err(PipelineError::Validation(format!(
            "Trim end {} is past the end of the media ({})",
            format_timestamp(end),
            format_timestamp(total_duration)
        )));
    }
    if end - start > max_duration {
        return Err(PipelineError::Validation(format!(
            "Selected clip is longer than the maximum of {}",
            format_timestamp(max_duration)
        )));
    }
    Ok(())
}

//! Conversion status state machine.
//!
//! `Pending -> Converting -> Ready | Failed`, driven one status response at a
//! time. The status contract has no failure flag, so `Failed` is inferred: the
//! worker reports it is idle but a required output is still missing once the
//! poll budget is spent. A worker that keeps reporting `is_converting` past the
//! budget is *not* failed; the tracker reports `Exhausted` and stays in
//! `Converting` so observation can be resumed later.

use crate::models::{ConversionState, ConversionStatus};

/// Outputs that must exist before a conversion counts as ready
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredOutputs {
    pub sample: bool,
}

impl RequiredOutputs {
    /// The main output is always required; the sample only when a trimmed
    /// sample was requested.
    pub fn for_trim(need_trim: bool) -> Self {
        Self { sample: need_trim }
    }

    pub fn satisfied_by(&self, status: &ConversionStatus) -> bool {
        status.main_video_exists && (!self.sample || status.sample_video_exists)
    }
}

/// What the poller should do after an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    KeepPolling,
    Ready,
    Failed,
    /// Budget spent while the worker still reports it is converting
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct ConversionTracker {
    state: ConversionState,
    required: RequiredOutputs,
    max_attempts: u32,
    attempts: u32,
    last: Option<ConversionStatus>,
}

impl ConversionTracker {
    pub fn new(required: RequiredOutputs, max_attempts: u32) -> Self {
        Self {
            state: ConversionState::Pending,
            required,
            max_attempts: max_attempts.max(1),
            attempts: 0,
            last: None,
        }
    }

    pub fn state(&self) -> ConversionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn last_status(&self) -> Option<&ConversionStatus> {
        self.last.as_ref()
    }

    pub fn budget_spent(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Grant a fresh poll budget without touching the state. Terminal states
    /// stay terminal.
    pub fn reset_attempts(&mut self) {
        self.attempts = 0;
    }

    /// Count a poll that produced no status at all, e.g. a dropped
    /// connection. Returns false once the budget is spent.
    pub fn record_miss(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.attempts += 1;
        !self.budget_spent()
    }

    /// Apply one status response.
    pub fn observe(&mut self, status: ConversionStatus) -> Observation {
        match self.state {
            ConversionState::Ready => return Observation::Ready,
            ConversionState::Failed => return Observation::Failed,
            ConversionState::Pending | ConversionState::Converting => {}
        }

        self.attempts += 1;
        let converting = status.is_converting;
        let satisfied = self.required.satisfied_by(&status);
        self.last = Some(status);

        if !converting && satisfied {
            self.state = ConversionState::Ready;
            return Observation::Ready;
        }

        self.state = ConversionState::Converting;
        if !self.budget_spent() {
            return Observation::KeepPolling;
        }

        if converting {
            Observation::Exhausted
        } else {
            self.state = ConversionState::Failed;
            Observation::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_converting_then_ready_takes_k_plus_one_polls() {
        for k in 0..5u32 {
            let mut tracker = ConversionTracker::new(RequiredOutputs::for_trim(false), 50);
            assert_eq!(tracker.state(), ConversionState::Pending);
            for _ in 0..k {
                assert_eq!(
                    tracker.observe(ConversionStatus::converting()),
                    Observation::KeepPolling
                );
                assert_eq!(tracker.state(), ConversionState::Converting);
            }
            assert_eq!(
                tracker.observe(ConversionStatus::finished(true, false)),
                Observation::Ready
            );
            assert_eq!(tracker.state(), ConversionState::Ready);
            assert_eq!(tracker.attempts(), k + 1);
        }
    }

    #[test]
    fn test_sample_required_only_when_trimmed() {
        let mut trimmed = ConversionTracker::new(RequiredOutputs::for_trim(true), 3);
        assert_eq!(
            trimmed.observe(ConversionStatus::finished(true, false)),
            Observation::KeepPolling
        );
        assert_eq!(
            trimmed.observe(ConversionStatus::finished(true, true)),
            Observation::Ready
        );
    }

    #[test]
    fn test_missing_output_after_budget_is_failed() {
        let mut tracker = ConversionTracker::new(RequiredOutputs::for_trim(false), 2);
        assert_eq!(
            tracker.observe(ConversionStatus::finished(false, false)),
            Observation::KeepPolling
        );
        assert_eq!(
            tracker.observe(ConversionStatus::finished(false, false)),
            Observation::Failed
        );
        assert_eq!(tracker.state(), ConversionState::Failed);
        // Terminal states absorb further observations.
        assert_eq!(
            tracker.observe(ConversionStatus::finished(true, true)),
            Observation::Failed
        );
        assert_eq!(tracker.attempts(), 2);
    }

    #[test]
    fn test_misses_count_toward_budget() {
        let mut tracker = ConversionTracker::new(RequiredOutputs::for_trim(false), 3);
        assert!(tracker.record_miss());
        assert_eq!(
            tracker.observe(ConversionStatus::converting()),
            Observation::KeepPolling
        );
        assert!(!tracker.record_miss());
        assert_eq!(tracker.state(), ConversionState::Converting);
    }

    #[test]
    fn test_sustained_converting_is_exhausted_not_failed() {
        let mut tracker = ConversionTracker::new(RequiredOutputs::for_trim(false), 2);
        tracker.observe(ConversionStatus::converting());
        assert_eq!(
            tracker.observe(ConversionStatus::converting()),
            Observation::Exhausted
        );
        assert_eq!(tracker.state(), ConversionState::Converting);

        tracker.reset_attempts();
        assert_eq!(
            tracker.observe(ConversionStatus::finished(true, false)),
            Observation::Ready
        );
    }
}

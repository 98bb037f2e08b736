//! Conversion status poller.
//!
//! Polls the server on a fixed interval and feeds each answer into a
//! [`ConversionTracker`]. Stopping the poller only stops observation; the job
//! keeps running on the server.

use async_trait::async_trait;
use mediaflow_core::error::is_retryable_upload_status;
use mediaflow_core::{
    ClientConfig, ConversionJob, ConversionState, ConversionStatus, ConversionTracker,
    Observation, PipelineError, PipelineResult, RequiredOutputs,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::events::{log_error, EventListener, NoopListener, PipelineEvent};
use crate::{ApiClient, Session};

/// Where conversion status comes from
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(
        &self,
        session: &Session,
        asset_id: &str,
    ) -> PipelineResult<ConversionStatus>;
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(
        &self,
        session: &Session,
        asset_id: &str,
    ) -> PipelineResult<ConversionStatus> {
        let path = format!("/conversions/{}/status", asset_id);
        self.get_json(session, &path)
            .await
            .map_err(|failure| failure.into_error(status_error))
    }
}

/// Transient answers become `Transport` so the poller retries them. Any other
/// 4xx ends polling: the session or the asset id will not get better.
fn status_error(status: u16, message: String) -> PipelineError {
    match status {
        401 | 403 => PipelineError::Credential {
            status: Some(status),
            message: format!("Status check refused: {}", message),
        },
        _ if is_retryable_upload_status(status) => {
            PipelineError::Transport(format!("Status check returned {}: {}", status, message))
        }
        _ => PipelineError::ConversionRequest {
            status: Some(status),
            message: format!("Status check rejected: {}", message),
        },
    }
}

/// How a polling run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "status", rename_all = "snake_case")]
pub enum PollOutcome {
    Ready(ConversionStatus),
    /// Worker went idle with a required output still missing
    Failed(ConversionStatus),
    /// The caller stopped observation
    Stopped,
}

pub struct ConversionStatusPoller {
    source: Arc<dyn StatusSource>,
    interval: Duration,
    max_attempts: u32,
    listener: Arc<dyn EventListener>,
}

impl ConversionStatusPoller {
    pub fn new(source: Arc<dyn StatusSource>, interval: Duration, max_attempts: u32) -> Self {
        Self {
            source,
            interval,
            max_attempts: max_attempts.max(1),
            listener: Arc::new(NoopListener),
        }
    }

    pub fn from_config(source: Arc<dyn StatusSource>, config: &ClientConfig) -> Self {
        Self::new(source, config.poll_interval(), config.poll_max_attempts)
    }

    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Fresh tracker for `job`, starting in `Pending`
    pub fn tracker_for(&self, job: &ConversionJob) -> ConversionTracker {
        ConversionTracker::new(RequiredOutputs::for_trim(job.needs_trim), self.max_attempts)
    }

    /// Observe `job` until it settles, the budget runs out or `cancel` fires.
    /// Starting again after a stop is safe; nothing is sent besides reads.
    pub async fn poll(
        &self,
        session: &Session,
        job: &ConversionJob,
        cancel: &CancellationToken,
    ) -> PipelineResult<PollOutcome> {
        let mut tracker = self.tracker_for(job);
        self.run(session, &job.asset_id, &mut tracker, cancel).await
    }

    /// Drive an existing tracker. A tracker that ended in `PollingExhausted`
    /// can be resumed after [`ConversionTracker::reset_attempts`].
    #[tracing::instrument(skip_all, fields(asset_id = %asset_id))]
    pub async fn run(
        &self,
        session: &Session,
        asset_id: &str,
        tracker: &mut ConversionTracker,
        cancel: &CancellationToken,
    ) -> PipelineResult<PollOutcome> {
        if let Some(outcome) = settled(tracker) {
            return Ok(outcome);
        }

        loop {
            let stopped = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = sleep(self.interval) => false,
            };
            if stopped {
                return Ok(self.stopped(asset_id));
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.source.fetch_status(session, asset_id) => Some(result),
            };
            let status = match fetched {
                None => return Ok(self.stopped(asset_id)),
                Some(Ok(status)) => status,
                Some(Err(err @ PipelineError::Transport(_))) => {
                    if tracker.record_miss() {
                        tracing::warn!(attempt = tracker.attempts(), "Status check failed: {}", err);
                        continue;
                    }
                    // The job was seen in flight; an unreachable last check
                    // does not change that.
                    if tracker.last_status().is_some() {
                        tracing::warn!("Last status check failed: {}", err);
                        return Err(self.exhausted(asset_id, tracker));
                    }
                    log_error(&err, "Status checks exhausted");
                    return Err(err);
                }
                Some(Err(err)) => {
                    log_error(&err, "Status check failed");
                    return Err(err);
                }
            };

            let before = tracker.state();
            let observation = tracker.observe(status);
            tracing::debug!(
                attempt = tracker.attempts(),
                state = %tracker.state(),
                "Conversion status observed"
            );
            if tracker.state() != before {
                self.listener.on_event(&PipelineEvent::StatusChanged {
                    asset_id: asset_id.to_string(),
                    state: tracker.state(),
                    attempt: tracker.attempts(),
                });
            }

            match observation {
                Observation::KeepPolling => {}
                Observation::Ready | Observation::Failed => {
                    if let Some(outcome) = settled(tracker) {
                        tracing::info!(
                            attempts = tracker.attempts(),
                            state = %tracker.state(),
                            "Conversion settled"
                        );
                        return Ok(outcome);
                    }
                }
                Observation::Exhausted => return Err(self.exhausted(asset_id, tracker)),
            }
        }
    }

    fn exhausted(&self, asset_id: &str, tracker: &ConversionTracker) -> PipelineError {
        self.listener.on_event(&PipelineEvent::StillProcessing {
            asset_id: asset_id.to_string(),
            attempts: tracker.attempts(),
        });
        let err = PipelineError::PollingExhausted {
            attempts: tracker.attempts(),
        };
        log_error(&err, "Conversion status");
        err
    }

    fn stopped(&self, asset_id: &str) -> PollOutcome {
        tracing::info!("Status polling stopped by caller");
        self.listener.on_event(&PipelineEvent::PollingStopped {
            asset_id: asset_id.to_string(),
        });
        PollOutcome::Stopped
    }
}

fn settled(tracker: &ConversionTracker) -> Option<PollOutcome> {
    let last = tracker.last_status().cloned()?;
    match tracker.state() {
        ConversionState::Ready => Some(PollOutcome::Ready(last)),
        ConversionState::Failed => Some(PollOutcome::Failed(last)),
        ConversionState::Pending | ConversionState::Converting => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers from a fixed script, repeating the last entry once exhausted
    struct ScriptedSource {
        script: Mutex<VecDeque<PipelineResult<ConversionStatus>>>,
        last: ConversionStatus,
        calls: Mutex<u32>,
    }

    impl ScriptedSource {
        fn new(script: Vec<PipelineResult<ConversionStatus>>, last: ConversionStatus) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last,
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn fetch_status(
            &self,
            _session: &Session,
            _asset_id: &str,
        ) -> PipelineResult<ConversionStatus> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(self.last.clone()))
        }
    }

    fn job(needs_trim: bool) -> ConversionJob {
        ConversionJob {
            asset_id: "post-7".to_string(),
            tmp_storage_key: "tmp/7.mp4".to_string(),
            needs_trim,
            trim: None,
            main_orientation: None,
            sample_orientation: None,
            content_type: None,
        }
    }

    fn poller(source: Arc<ScriptedSource>, max_attempts: u32) -> ConversionStatusPoller {
        ConversionStatusPoller::new(source, Duration::from_millis(1), max_attempts)
    }

    #[tokio::test]
    async fn test_ready_after_k_plus_one_polls() {
        let k = 3;
        let mut script: Vec<_> = (0..k).map(|_| Ok(ConversionStatus::converting())).collect();
        script.push(Ok(ConversionStatus::finished(true, false)));
        let source = ScriptedSource::new(script, ConversionStatus::converting());

        let outcome = poller(source.clone(), 20)
            .poll(&Session::Anonymous, &job(false), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Ready(ConversionStatus::finished(true, false)));
        assert_eq!(source.calls(), k + 1);
    }

    #[tokio::test]
    async fn test_sustained_converting_is_soft_timeout() {
        let source = ScriptedSource::new(vec![], ConversionStatus::converting());
        let err = poller(source.clone(), 4)
            .poll(&Session::Anonymous, &job(false), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::PollingExhausted { attempts: 4 }));
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn test_missing_sample_after_budget_is_failed() {
        let source = ScriptedSource::new(vec![], ConversionStatus::finished(true, false));
        let outcome = poller(source, 2)
            .poll(&Session::Anonymous, &job(true), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Failed(ConversionStatus::finished(true, false)));
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried_within_budget() {
        let source = ScriptedSource::new(
            vec![
                Err(PipelineError::Transport("connection reset".to_string())),
                Ok(ConversionStatus::converting()),
            ],
            ConversionStatus::finished(true, false),
        );
        let outcome = poller(source.clone(), 5)
            .poll(&Session::Anonymous, &job(false), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, PollOutcome::Ready(_)));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_last_check_after_converting_is_still_processing() {
        let source = ScriptedSource::new(
            vec![
                Ok(ConversionStatus::converting()),
                Ok(ConversionStatus::converting()),
                Err(PipelineError::Transport("connection reset".to_string())),
            ],
            ConversionStatus::converting(),
        );
        let err = poller(source.clone(), 3)
            .poll(&Session::Anonymous, &job(false), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::PollingExhausted { attempts: 3 }));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_never_reached_stays_transport_error() {
        let source = ScriptedSource::new(
            vec![
                Err(PipelineError::Transport("connection refused".to_string())),
                Err(PipelineError::Transport("connection refused".to_string())),
            ],
            ConversionStatus::converting(),
        );
        let err = poller(source, 2)
            .poll(&Session::Anonymous, &job(false), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
    }

    #[tokio::test]
    async fn test_refused_status_check_is_not_retried() {
        let source = ScriptedSource::new(
            vec![Err(status_error(401, "token expired".to_string()))],
            ConversionStatus::converting(),
        );
        let err = poller(source.clone(), 5)
            .poll(&Session::Anonymous, &job(false), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Credential { status: Some(401), .. }));
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_status_error_classification() {
        assert!(matches!(status_error(503, String::new()), PipelineError::Transport(_)));
        assert!(matches!(status_error(429, String::new()), PipelineError::Transport(_)));
        assert!(matches!(
            status_error(404, String::new()),
            PipelineError::ConversionRequest { status: Some(404), .. }
        ));
    }

    #[tokio::test]
    async fn test_cancel_stops_without_polling() {
        let source = ScriptedSource::new(vec![], ConversionStatus::converting());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = poller(source.clone(), 5)
            .poll(&Session::Anonymous, &job(false), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Stopped);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_tracker_can_resume() {
        let source = ScriptedSource::new(
            vec![Ok(ConversionStatus::converting()), Ok(ConversionStatus::converting())],
            ConversionStatus::finished(true, false),
        );
        let poller = poller(source, 2);
        let job = job(false);
        let mut tracker = poller.tracker_for(&job);
        let cancel = CancellationToken::new();

        let first = poller
            .run(&Session::Anonymous, &job.asset_id, &mut tracker, &cancel)
            .await;
        assert!(matches!(first, Err(PipelineError::PollingExhausted { .. })));

        tracker.reset_attempts();
        let second = poller
            .run(&Session::Anonymous, &job.asset_id, &mut tracker, &cancel)
            .await
            .unwrap();
        assert!(matches!(second, PollOutcome::Ready(_)));

        // Settled trackers answer without another request.
        let third = poller
            .run(&Session::Anonymous, &job.asset_id, &mut tracker, &cancel)
            .await
            .unwrap();
        assert_eq!(third, second);
    }
}

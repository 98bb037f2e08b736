//! Conversion trigger.
//!
//! Tells the application server that an uploaded object is ready to be
//! transcoded. The call returns as soon as the job is enqueued.

use async_trait::async_trait;
use mediaflow_core::validation::{validate_conversion_request, TrimLimits};
use mediaflow_core::{ConversionAck, ConversionJob, ConversionRequest, PipelineError, PipelineResult};
use std::sync::Arc;

use crate::events::{log_error, EventListener, NoopListener, PipelineEvent};
use crate::{ApiClient, Session};

const CONVERSIONS_PATH: &str = "/conversions";

/// Server endpoint that enqueues conversion jobs
#[async_trait]
pub trait ConversionApi: Send + Sync {
    async fn trigger_conversion(
        &self,
        session: &Session,
        request: &ConversionRequest,
    ) -> PipelineResult<ConversionAck>;
}

#[async_trait]
impl ConversionApi for ApiClient {
    async fn trigger_conversion(
        &self,
        session: &Session,
        request: &ConversionRequest,
    ) -> PipelineResult<ConversionAck> {
        self.post_json(session, CONVERSIONS_PATH, request)
            .await
            .map_err(|failure| {
                failure.into_error(|status, message| PipelineError::ConversionRequest {
                    status: Some(status),
                    message,
                })
            })
    }
}

pub struct ConversionTrigger {
    api: Arc<dyn ConversionApi>,
    listener: Arc<dyn EventListener>,
}

impl ConversionTrigger {
    pub fn new(api: Arc<dyn ConversionApi>) -> Self {
        Self {
            api,
            listener: Arc::new(NoopListener),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Validate `request` locally, then enqueue it. Invalid trim bounds never
    /// reach the server. A 2xx answer whose status names a refusal is treated
    /// like an error status.
    #[tracing::instrument(skip_all, fields(asset_id = %asset_id, need_trim = request.need_trim))]
    pub async fn request_conversion(
        &self,
        session: &Session,
        asset_id: &str,
        request: &ConversionRequest,
        limits: TrimLimits,
    ) -> PipelineResult<ConversionJob> {
        if asset_id.trim().is_empty() {
            return Err(PipelineError::Validation(
                "Asset id is required to track a conversion".to_string(),
            ));
        }
        if let Err(err) = validate_conversion_request(request, limits) {
            log_error(&err, "Conversion request not sent");
            return Err(err);
        }

        let ack = match self.api.trigger_conversion(session, request).await {
            Ok(ack) => ack,
            Err(err) => {
                log_error(&err, "Conversion trigger failed");
                return Err(err);
            }
        };

        if !ack.is_accepted() {
            let err = PipelineError::ConversionRequest {
                status: None,
                message: if ack.message.is_empty() {
                    format!("server answered {}", ack.status)
                } else {
                    ack.message
                },
            };
            log_error(&err, "Conversion trigger refused");
            return Err(err);
        }

        if ack.tmp_storage_key != request.tmp_storage_key {
            tracing::warn!(
                expected = %request.tmp_storage_key,
                received = %ack.tmp_storage_key,
                "Conversion acknowledged for a different storage key"
            );
        }

        self.listener.on_event(&PipelineEvent::ConversionRequested {
            tmp_storage_key: request.tmp_storage_key.clone(),
            need_trim: request.need_trim,
        });
        tracing::info!(status = %ack.status, "Conversion enqueued");

        Ok(ConversionJob::from_request(asset_id, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaflow_core::TrimBounds;
    use std::sync::Mutex;

    /// Records requests and answers with a fixed ack
    struct RecordingApi {
        ack: ConversionAck,
        calls: Mutex<Vec<ConversionRequest>>,
    }

    impl RecordingApi {
        fn answering(status: &str) -> Arc<Self> {
            Arc::new(Self {
                ack: ConversionAck {
                    status: status.to_string(),
                    message: String::new(),
                    tmp_storage_key: "tmp/clip.mp4".to_string(),
                },
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ConversionApi for RecordingApi {
        async fn trigger_conversion(
            &self,
            _session: &Session,
            request: &ConversionRequest,
        ) -> PipelineResult<ConversionAck> {
            self.calls.lock().unwrap().push(request.clone());
            Ok(self.ack.clone())
        }
    }

    #[tokio::test]
    async fn test_missing_trim_bounds_never_sent() {
        let api = RecordingApi::answering("success");
        let trigger = ConversionTrigger::new(api.clone());
        let mut request = ConversionRequest::new("tmp/clip.mp4");
        request.need_trim = true;
        request.start_time = Some(10.0);

        let err = trigger
            .request_conversion(&Session::Anonymous, "post-1", &request, TrimLimits::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_trim_never_sent() {
        let api = RecordingApi::answering("success");
        let trigger = ConversionTrigger::new(api.clone());
        let request =
            ConversionRequest::new("tmp/clip.mp4").with_trim(TrimBounds::new(10.0, 90.0));

        let err = trigger
            .request_conversion(
                &Session::Anonymous,
                "post-1",
                &request,
                TrimLimits::new(120.0, 60.0),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_refusal_in_success_body() {
        let api = RecordingApi::answering("conflict");
        let trigger = ConversionTrigger::new(api.clone());
        let request = ConversionRequest::new("tmp/clip.mp4");

        let err = trigger
            .request_conversion(&Session::Anonymous, "post-1", &request, TrimLimits::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ConversionRequest { .. }));
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_accepted_request_builds_job() {
        let api = RecordingApi::answering("success");
        let trigger = ConversionTrigger::new(api.clone());
        let request =
            ConversionRequest::new("tmp/clip.mp4").with_trim(TrimBounds::new(10.0, 50.0));

        let job = trigger
            .request_conversion(
                &Session::Anonymous,
                "post-1",
                &request,
                TrimLimits::new(120.0, 60.0),
            )
            .await
            .unwrap();
        assert_eq!(job.asset_id, "post-1");
        assert!(job.needs_trim);
        assert_eq!(job.trim, Some(TrimBounds::new(10.0, 50.0)));
    }
}

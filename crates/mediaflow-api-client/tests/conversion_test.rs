mod helpers;

use helpers::{api_path, session, test_config};
use mediaflow_api_client::{
    ApiClient, ConversionStatusPoller, ConversionTrigger, PollOutcome, StatusSource,
};
use mediaflow_core::validation::TrimLimits;
use mediaflow_core::{ConversionRequest, ConversionStatus, PipelineError, TrimBounds};
use mockito::Matcher;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn trigger(server_url: &str) -> ConversionTrigger {
    ConversionTrigger::new(Arc::new(ApiClient::new(&test_config(server_url)).unwrap()))
}

#[tokio::test]
async fn test_need_trim_without_bounds_is_never_sent() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", api_path("/conversions").as_str())
        .expect(0)
        .create_async()
        .await;

    let mut request = ConversionRequest::new("tmp/main.mp4");
    request.need_trim = true;

    let err = trigger(&server.url())
        .request_conversion(&session(), "post-1", &request, TrimLimits::default())
        .await
        .unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[tokio::test]
async fn test_trigger_sends_trim_and_orientation() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", api_path("/conversions").as_str())
        .match_body(Matcher::Json(json!({
            "tmp_storage_key": "tmp/main.mp4",
            "need_trim": true,
            "start_time": 10.5,
            "end_time": 50.25,
            "main_orientation": "landscape"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status":"success","message":"queued","tmp_storage_key":"tmp/main.mp4"}"#)
        .expect(1)
        .create_async()
        .await;

    let request = ConversionRequest::new("tmp/main.mp4")
        .with_trim(TrimBounds::new(10.5, 50.25))
        .with_orientations(Some(mediaflow_core::Orientation::Landscape), None);

    let job = trigger(&server.url())
        .request_conversion(&session(), "post-1", &request, TrimLimits::new(120.0, 60.0))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(job.trim, Some(TrimBounds::new(10.5, 50.25)));
}

#[tokio::test]
async fn test_conflict_is_conversion_request_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", api_path("/conversions").as_str())
        .with_status(409)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"conversion already in progress"}"#)
        .create_async()
        .await;

    let err = trigger(&server.url())
        .request_conversion(
            &session(),
            "post-1",
            &ConversionRequest::new("tmp/main.mp4"),
            TrimLimits::default(),
        )
        .await
        .unwrap_err();

    match err {
        PipelineError::ConversionRequest { status, message } => {
            assert_eq!(status, Some(409));
            assert_eq!(message, "conversion already in progress");
        }
        other => panic!("expected conversion request error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_status_decodes_response() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", api_path("/conversions/post-1/status").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"is_converting":false,"main_video_exists":true,"sample_video_exists":false,"message":"done"}"#)
        .create_async()
        .await;

    let api = ApiClient::new(&test_config(&server.url())).unwrap();
    let status = api.fetch_status(&session(), "post-1").await.unwrap();
    assert!(!status.is_converting);
    assert!(status.main_video_exists);
    assert_eq!(status.message.as_deref(), Some("done"));
}

#[tokio::test]
async fn test_poller_over_http_reaches_ready() {
    let mut server = mockito::Server::new_async().await;
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let mock = server
        .mock("GET", api_path("/conversions/post-1/status").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body_from_request(move |_| {
            let status = if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                ConversionStatus::converting()
            } else {
                ConversionStatus::finished(true, false)
            };
            serde_json::to_vec(&status).unwrap()
        })
        .expect(3)
        .create_async()
        .await;

    let config = test_config(&server.url());
    let api = Arc::new(ApiClient::new(&config).unwrap());
    let poller = ConversionStatusPoller::from_config(api, &config);
    let job = mediaflow_core::ConversionJob::from_request(
        "post-1",
        &ConversionRequest::new("tmp/main.mp4"),
    );

    let outcome = poller
        .poll(&session(), &job, &CancellationToken::new())
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(matches!(outcome, PollOutcome::Ready(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_expired_session_stops_polling_on_first_answer() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", api_path("/conversions/post-1/status").as_str())
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"token expired"}"#)
        .expect(1)
        .create_async()
        .await;

    let config = test_config(&server.url());
    let api = Arc::new(ApiClient::new(&config).unwrap());
    let job = mediaflow_core::ConversionJob::from_request(
        "post-1",
        &ConversionRequest::new("tmp/main.mp4"),
    );

    let err = ConversionStatusPoller::from_config(api, &config)
        .poll(&session(), &job, &CancellationToken::new())
        .await
        .unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, PipelineError::Credential { status: Some(401), .. }));
}

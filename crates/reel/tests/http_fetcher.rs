//! `HttpRangeFetcher` against a local range server.

mod common;

use std::time::Duration;

use common::{ClipServer, test_client_config};
use reel_engine::{ByteRange, HttpRangeFetcher, RangeFetcher, ReelError};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use url::Url;

fn fetcher() -> HttpRangeFetcher {
    HttpRangeFetcher::from_config(&test_client_config()).unwrap()
}

#[tokio::test]
async fn range_request_returns_only_the_prefix() {
    let server = ClipServer::start().await;
    let url = Url::parse(&server.url("clip.mp4")).unwrap();

    let response = fetcher()
        .fetch_range(&url, ByteRange::prefix(1024), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status, 206);
    assert_eq!(response.body.len(), 1024);
    assert_eq!(response.content_type.as_deref(), Some("video/mp4"));
    assert_eq!(
        response.content_range,
        Some(format!("bytes 0-1023/{}", server.body_len()))
    );
    assert_eq!(server.clip_hits(), 1);
}

#[tokio::test]
async fn short_resource_is_returned_whole() {
    let server = ClipServer::start().await;
    let url = Url::parse(&server.url("clip.mp4")).unwrap();

    let response = fetcher()
        .fetch_range(&url, ByteRange::prefix(10 * 1024 * 1024), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.body.len(), server.body_len());
}

#[tokio::test]
async fn body_is_capped_when_server_ignores_range() {
    let server = ClipServer::start().await;
    let url = Url::parse(&server.url("ignores-range.mp4")).unwrap();

    let response = fetcher()
        .fetch_range(&url, ByteRange::prefix(100), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body.len(), 100);
}

#[tokio::test]
async fn missing_resource_reports_http_status() {
    let server = ClipServer::start().await;
    let url = Url::parse(&server.url("missing.mp4")).unwrap();

    let err = fetcher()
        .fetch_range(&url, ByteRange::prefix(1024), &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        ReelError::HttpStatus { status, operation, .. } => {
            assert_eq!(*status, StatusCode::NOT_FOUND);
            assert_eq!(*operation, "preload");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!err.is_cancelled());
}

#[tokio::test]
async fn cancellation_aborts_a_pending_request() {
    let server = ClipServer::start().await;
    let url = Url::parse(&server.url("hang.mp4")).unwrap();
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        fetcher().fetch_range(&url, ByteRange::prefix(1024), &token),
    )
    .await
    .expect("fetch did not observe cancellation");

    assert!(result.unwrap_err().is_cancelled());
}

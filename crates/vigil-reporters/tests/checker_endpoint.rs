//! A running checker feeding the HTTP status endpoint.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use vigil_core::{CancellationToken, Checker, CheckerConfig, ProbeFn};
use vigil_reporters::HttpReporter;

#[tokio::test]
async fn endpoint_reflects_emitted_status() {
    let checker = Checker::new(CheckerConfig::default().with_failure_threshold(1));
    checker
        .add_probe("db", ProbeFn::new(|_| async { Err(anyhow::anyhow!("connection refused")) }))
        .await;
    checker
        .add_probe("cache", ProbeFn::new(|_| async { Ok(()) }))
        .await;

    let reporter = HttpReporter::default();
    checker.add_reporter(reporter.clone()).await;

    let token = CancellationToken::new();
    let mut stream = checker.start(token.clone()).await.unwrap();
    assert!(!stream.recv().await.unwrap().is_healthy());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while reporter.last().await.outcomes().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "reporter never received a status");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = reporter.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    token.cancel();
    checker.wait().await;
}

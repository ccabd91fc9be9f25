//! Health and metrics endpoint integration tests.

use passport_test_utils::{utc, CountingKeySetSource, TestPassportServer};
use std::sync::Arc;

async fn server() -> Result<TestPassportServer, anyhow::Error> {
    TestPassportServer::spawn(
        utc(2025, 3, 1),
        "http://127.0.0.1:1/jwks.json",
        Arc::new(CountingKeySetSource::new()),
    )
    .await
}

/// Test that /health liveness endpoint returns 200 and plain text "OK".
#[tokio::test]
async fn test_health_endpoint_returns_200() -> Result<(), anyhow::Error> {
    let server = server().await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await?, "OK");

    Ok(())
}

/// Test that /metrics serves the Prometheus text format.
#[tokio::test]
async fn test_metrics_endpoint_returns_200() -> Result<(), anyhow::Error> {
    let server = server().await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;

    assert_eq!(response.status(), 200);

    Ok(())
}

/// Test that non-existent routes return 404.
#[tokio::test]
async fn test_unknown_route_returns_404() -> Result<(), anyhow::Error> {
    let server = server().await?;

    let response = reqwest::get(format!("{}/api/v1/nonexistent", server.url())).await?;

    assert_eq!(response.status(), 404);

    Ok(())
}

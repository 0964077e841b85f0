//! Static engine behavior against a local HTTP server.

use url::Url;

use anycrawl::engine::static_engine::StaticEngine;
use anycrawl::engine::{EngineContext, FetchSpec};
use anycrawl::error::EngineError;
use anycrawl::types::Engine;

fn spec(url: &str) -> FetchSpec {
    FetchSpec {
        url: Url::parse(url).unwrap(),
        engine: Engine::Static,
        timeout_ms: 10_000,
        wait_for_ms: None,
        proxy: None,
    }
}

#[tokio::test]
async fn fetches_html_with_status_and_headers() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/page")
        .with_status(200)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_body("<html><title>200 OK</title><body>200 OK</body></html>")
        .create_async()
        .await;

    let engine = StaticEngine::new(None, false, true);
    let output = engine.fetch(&spec(&format!("{}/page", server.url()))).await.unwrap();

    assert_eq!(output.status, 200);
    assert!(output.is_success_status());
    assert!(output.html().contains("200 OK"));
    assert!(output.headers.get("content-type").unwrap().starts_with("text/html"));
    match &output.context {
        EngineContext::Static { content_type, .. } => {
            assert!(content_type.as_deref().unwrap().starts_with("text/html"));
        }
        EngineContext::Browser { .. } => panic!("static engine produced a browser context"),
    }
}

#[tokio::test]
async fn non_2xx_body_is_still_returned() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/blocked")
        .with_status(403)
        .with_header("content-type", "text/html")
        .with_body("<html><body>403 Forbidden</body></html>")
        .create_async()
        .await;

    let engine = StaticEngine::new(None, false, true);
    let output = engine.fetch(&spec(&format!("{}/blocked", server.url()))).await.unwrap();

    assert_eq!(output.status, 403);
    assert!(!output.is_success_status());
    assert!(output.html().contains("403 Forbidden"), "failure payload carries the origin body");
}

#[tokio::test]
async fn disallowed_content_types_are_rejected() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/binary")
        .with_status(200)
        .with_header("content-type", "application/octet-stream")
        .with_body(vec![0u8, 159, 146, 150])
        .create_async()
        .await;

    let engine = StaticEngine::new(None, false, true);
    let err = engine.fetch(&spec(&format!("{}/binary", server.url()))).await.unwrap_err();

    match err {
        EngineError::Http { status, message } => {
            assert_eq!(status, 200);
            assert!(message.contains("unsupported content type"));
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn plain_text_is_allowed() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_header("content-type", "text/plain")
        .with_body("User-agent: *\nAllow: /")
        .create_async()
        .await;

    let engine = StaticEngine::new(None, false, true);
    let output = engine.fetch(&spec(&format!("{}/robots.txt", server.url()))).await.unwrap();
    assert!(output.html().contains("User-agent"));
}

//! Integration tests for the HTTP status surface.
//!
//! Binds an ephemeral port to avoid conflicts with running instances.

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;

use kerbside::http::serve_listener;
use kerbside::schedule::EngineHandle;

use super::test_helpers::{nz, red_only, FakeSource, Reply, RunningEngine};

async fn spawn_server(engine: EngineHandle, ct: CancellationToken) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = serve_listener(listener, engine, ct).await;
    });
    addr
}

#[tokio::test]
async fn health_returns_ok() {
    let running = RunningEngine::start(FakeSource::default(), nz(2025, 10, 7, 19, 0));
    let addr = spawn_server(running.handle.clone(), running.ct.clone()).await;

    let response = reqwest::get(format!("http://{addr}/health"))
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.expect("body"), "ok");

    running.stop().await;
}

#[tokio::test]
async fn status_returns_engine_view_json() {
    let source = FakeSource::new([Reply::Dates(red_only(2025, 10, 8))]);
    let running = RunningEngine::start(source, nz(2025, 10, 7, 19, 0));
    running.handle.refresh().await;
    running.wait_for(|view| view.red_date.is_some()).await;
    let addr = spawn_server(running.handle.clone(), running.ct.clone()).await;

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/status"))
        .await
        .expect("request")
        .json()
        .await
        .expect("json body");

    assert_eq!(body["ok"], serde_json::Value::Bool(true));
    assert_eq!(body["red_date"], "2025-10-08");
    assert_eq!(body["tasks"].as_array().expect("tasks").len(), 4);
    assert_eq!(
        body["tasks"][0]["window_start"],
        "2025-10-07T18:00:00+13:00"
    );

    running.stop().await;
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let running = RunningEngine::start(FakeSource::default(), nz(2025, 10, 7, 19, 0));
    let addr = spawn_server(running.handle.clone(), running.ct.clone()).await;

    let response = reqwest::get(format!("http://{addr}/nope"))
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    running.stop().await;
}

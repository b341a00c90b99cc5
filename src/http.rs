//! Loopback HTTP status surface.
//!
//! `GET /health` answers `ok`; `GET /status` returns the latest
//! [`EngineView`](crate::schedule::EngineView) as JSON.

use std::net::SocketAddr;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::schedule::{EngineHandle, EngineView};
use crate::{AppError, Result};

/// Handler for `GET /health`: 200 OK with a plain-text body.
async fn health() -> &'static str {
    "ok"
}

async fn status(State(engine): State<EngineHandle>) -> Json<EngineView> {
    Json(engine.view())
}

/// Router exposing the status endpoints.
pub fn router(engine: EngineHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(engine)
}

/// Bind `127.0.0.1:port` and serve until `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Http` if the server fails to bind or stops abnormally.
pub async fn serve(port: u16, engine: EngineHandle, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Http(format!("failed to bind http on {bind}: {err}")))?;
    serve_listener(listener, engine, ct).await
}

/// Serve on an already bound listener until `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Http` if the server stops abnormally.
pub async fn serve_listener(
    listener: TcpListener,
    engine: EngineHandle,
    ct: CancellationToken,
) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|err| AppError::Http(format!("listener has no address: {err}")))?;
    info!(bind = %local, "starting http status server");

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Http(format!("http server error: {err}")))?;

    info!("http status server shut down");
    Ok(())
}

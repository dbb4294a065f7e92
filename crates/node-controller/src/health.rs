//! Liveness and readiness probes.

use std::net::SocketAddr;

use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

const SERVICE: &str = "kamatera-node-controller";

/// Router serving `/healthz` and `/readyz`.
pub fn router() -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/readyz", get(readiness_check))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
}

/// Serve the probes on `addr` until `shutdown` is cancelled.
///
/// # Errors
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Health probes listening");

    axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness_check() -> Json<Value> {
    Json(json!({
        "status": "ready",
        "service": SERVICE,
    }))
}

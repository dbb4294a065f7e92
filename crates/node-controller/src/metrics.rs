//! Reconciliation counters, served as JSON on `/metrics`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use crate::reconciler::Outcome;

/// Counters updated by every reconciliation pass.
#[derive(Debug, Default)]
pub struct ControllerMetrics {
    reconciles: AtomicU64,
    deletions: AtomicU64,
    requeues: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`ControllerMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub reconciles: u64,
    pub deletions: u64,
    pub requeues: u64,
    pub errors: u64,
}

impl ControllerMetrics {
    /// Count a pass that finished with `outcome`.
    pub fn record_outcome(&self, outcome: &Outcome) {
        self.reconciles.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Outcome::NoOp => {}
            Outcome::Requeue(_) => {
                self.requeues.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Deleted(_) => {
                self.deletions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Count a pass that failed.
    pub fn record_error(&self) {
        self.reconciles.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reconciles: self.reconciles.load(Ordering::Relaxed),
            deletions: self.deletions.load(Ordering::Relaxed),
            requeues: self.requeues.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Router serving `/metrics` from `metrics`.
pub fn router(metrics: Arc<ControllerMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(metrics)
}

/// Serve `/metrics` on `addr` until `shutdown` is cancelled.
///
/// # Errors
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(
    addr: SocketAddr,
    metrics: Arc<ControllerMetrics>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Metrics listening");

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn metrics_handler(State(metrics): State<Arc<ControllerMetrics>>) -> Json<MetricsSnapshot> {
    Json(metrics.snapshot())
}

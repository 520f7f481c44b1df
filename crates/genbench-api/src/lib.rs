//! HTTP exporter: prometheus scrape endpoint plus a read-only view of the
//! results ledger. One listener per process role.

use std::io::ErrorKind;
use std::path::PathBuf;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use genbench_core::{LedgerError, ResultsLedger};
use genbench_obs::{wait_for_shutdown, Telemetry};
use once_cell::sync::Lazy;
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;

static ENCODER: Lazy<TextEncoder> = Lazy::new(TextEncoder::new);

#[derive(Clone)]
pub struct ExporterState {
    telemetry: Telemetry,
    results_path: Option<PathBuf>,
}

impl ExporterState {
    pub fn new(telemetry: Telemetry) -> Self { Self { telemetry, results_path: None } }

    /// Exposes the ledger at `path` under `/results`.
    pub fn with_results(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_path = Some(path.into());
        self
    }
}

pub fn app(state: ExporterState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics))
        .route("/results", get(results))
        .with_state(state)
}

pub async fn bind(host: &str, port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((host, port)).await
}

/// Serves until `true` is published on `shutdown`, then drains in-flight scrapes.
pub async fn serve(listener: TcpListener, state: ExporterState, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(target: "api", %addr, "Metrics server started on port {}", addr.port());
    }
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            wait_for_shutdown(&mut shutdown).await;
            tracing::info!(target: "api", "shutdown signal received");
        })
        .await
}

async fn metrics(State(state): State<ExporterState>) -> impl IntoResponse {
    let families = state.telemetry.registry().gather();
    let mut buffer = Vec::new();
    match ENCODER.encode(&families, &mut buffer) {
        Ok(()) => (StatusCode::OK, [("content-type", ENCODER.format_type().to_string())], buffer),
        Err(e) => {
            tracing::warn!(target: "api", error = %e, "metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, [("content-type", "text/plain".to_string())], e.to_string().into_bytes())
        }
    }
}

async fn results(State(state): State<ExporterState>) -> Response {
    let Some(path) = state.results_path.as_deref() else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "no results ledger configured" }))).into_response();
    };
    match ResultsLedger::load(path) {
        Ok(outcomes) => Json(outcomes).into_response(),
        // Nothing has finished yet.
        Err(LedgerError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => Json(json!([])).into_response(),
        Err(e) => {
            tracing::warn!(target: "api", path = %path.display(), error = %e, "failed to read results ledger");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

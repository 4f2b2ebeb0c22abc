//! Unauthenticated operational endpoints (spec §4.9): liveness, readiness,
//! and Prometheus metrics.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::metrics::render_prometheus;
use crate::state::AppState;

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Probes the database pool with `SELECT 1` the way a readiness check has to
/// exercise its actual dependencies rather than just confirming the process
/// is alive.
pub async fn readyz(State(state): State<AppState>) -> Response {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "readiness probe failed: database unreachable");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let text = render_prometheus(&state.metrics, &state.pipeline.normalizer().metrics);
    ([("content-type", "text/plain; version=0.0.4")], text).into_response()
}

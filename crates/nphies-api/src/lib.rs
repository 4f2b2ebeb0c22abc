//! Submission API (spec §4.9, component C9): the HTTP surface in front of the
//! [`nphies_orchestrator::Pipeline`] — `POST /claim`, `GET /claim/{id}`, and
//! the unauthenticated `/healthz`, `/readyz`, `/metrics` probes.
//!
//! ## Middleware stack (execution order)
//!
//! ```text
//! TraceLayer → body/depth guard → rate limiter → handler
//! ```
//!
//! Health and metrics routes are mounted outside the rate limiter and guard
//! so monitoring traffic is never itself rate-limited or body-inspected.

pub mod config;
pub mod error;
pub mod middleware;
pub mod metrics;
pub mod routes;
pub mod state;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let claim_api = Router::new()
        .route("/claim", post(routes::claim::submit_claim))
        .route("/claim/:claim_id", get(routes::claim::get_claim_status))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit_middleware))
        .layer(from_fn_with_state(state.clone(), middleware::body_guard_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let ops = Router::new()
        .route("/healthz", get(routes::ops::healthz))
        .route("/readyz", get(routes::ops::readyz))
        .route("/metrics", get(routes::ops::metrics))
        .with_state(state);

    Router::new().merge(claim_api).merge(ops)
}

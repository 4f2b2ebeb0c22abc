//! Application state (spec §4.9): everything a handler needs, constructed
//! once at startup and cloned cheaply per request via `Arc` the way the
//! corpus's `AppState` pattern does.

use std::sync::Arc;

use sqlx::PgPool;

use nphies_core::TransactionHistoryReader;
use nphies_envelope::RateLimiter;
use nphies_orchestrator::Pipeline;

use crate::config::AppConfig;
use crate::metrics::ApiMetrics;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub history_reader: Arc<dyn TransactionHistoryReader>,
    pub pool: PgPool,
    pub claim_rate_limiter: Arc<RateLimiter>,
    pub status_rate_limiter: Arc<RateLimiter>,
    pub metrics: Arc<ApiMetrics>,
    pub config: Arc<AppConfig>,
}

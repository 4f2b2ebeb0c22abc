//! Pool configuration (spec §4.2): connection bounds the operator tunes per
//! deployment.

use std::time::Duration;

use nphies_core::constants::{DB_POOL_MAX_DEFAULT, DB_POOL_MIN_DEFAULT};
use nphies_envelope::ClaimError;
use sqlx::postgres::{PgPool, PgPoolOptions};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub dsn: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            dsn: String::new(),
            min_connections: DB_POOL_MIN_DEFAULT,
            max_connections: DB_POOL_MAX_DEFAULT,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

pub async fn connect(config: &PoolConfig) -> Result<PgPool, ClaimError> {
    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.dsn)
        .await
        .map_err(|e| {
            ClaimError::upstream_unavailable("CATALOGUE_POOL_CONNECT_FAILED", e.to_string())
                .with_stage("catalogue")
        })
}

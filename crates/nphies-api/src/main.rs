//! Binary entrypoint: loads [`nphies_api::config::AppConfig`], wires the
//! catalogue store, cache, pricing engine, signer, gateway client, and
//! pipeline orchestrator together, then serves the HTTP API.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use nphies_cache::NullSharedCache;
use nphies_catalogue::{connect, PgCatalogueStore, PoolConfig};
use nphies_envelope::RateLimiter;
use nphies_gateway::{GatewayClient, GatewayConfig};
use nphies_normalizer::{NullSuggestionProvider, Normalizer};
use nphies_orchestrator::Pipeline;
use nphies_pricing::PricingService;
use nphies_signer::{EnvKeySource, Signer};

use nphies_api::config::AppConfig;
use nphies_api::metrics::ApiMetrics;
use nphies_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    let format = config.log.format.clone();
    let subscriber = tracing_subscriber::fmt().with_env_filter(&config.log.level);
    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let pool = connect(&PoolConfig {
        dsn: config.db.dsn(),
        min_connections: config.db.pool_min,
        max_connections: config.db.pool_max,
        acquire_timeout: std::time::Duration::from_secs(5),
    })
    .await?;

    let store = Arc::new(PgCatalogueStore::new(pool.clone()));
    let shared_cache = Arc::new(NullSharedCache);
    let ai_provider = Arc::new(NullSuggestionProvider);

    let normalizer = Arc::new(Normalizer::new(
        store.clone(),
        shared_cache,
        ai_provider,
        config.cache.local_entries_max,
    ));
    let pricing = Arc::new(PricingService::new(store.clone()));

    // Per-facility key references are provisioned out-of-band (KMS/vault
    // deployments populate this at startup); none are pre-wired here.
    let key_source = Arc::new(EnvKeySource::new(HashMap::new()));
    let signer = Arc::new(Signer::new(store.clone(), key_source));

    let token = config.nphies.resolve_token()?;
    let mut gateway_config = GatewayConfig::new(config.nphies.base_url.clone(), token);
    gateway_config.connect_timeout = std::time::Duration::from_millis(config.nphies.connect_timeout_ms);
    gateway_config.request_timeout = std::time::Duration::from_millis(config.nphies.request_timeout_ms);
    gateway_config.max_attempts = config.nphies.retries_max;
    gateway_config.backoff_base = std::time::Duration::from_millis(config.nphies.backoff_base_ms);
    gateway_config.backoff_cap = std::time::Duration::from_millis(config.nphies.backoff_cap_ms);
    let gateway = Arc::new(GatewayClient::new(gateway_config, store.clone())?);

    let pipeline_config = config.pipeline.to_orchestrator_config("claims/submit".to_string());
    let pipeline = Arc::new(Pipeline::new(
        pool.clone(),
        normalizer,
        pricing,
        signer,
        gateway,
        store.clone(),
        pipeline_config,
    ));

    let claim_rate_limiter = Arc::new(RateLimiter::new(config.claim_rate_limit.to_limiter_config()));
    let status_rate_limiter = Arc::new(RateLimiter::new(config.status_rate_limit.to_limiter_config()));

    let state = AppState {
        pipeline,
        history_reader: store.clone(),
        pool,
        claim_rate_limiter,
        status_rate_limiter,
        metrics: Arc::new(ApiMetrics::new()),
        config: Arc::new(config.clone()),
    };

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "nphies-api listening");

    axum::serve(
        listener,
        nphies_api::app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

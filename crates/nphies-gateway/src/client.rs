//! The NPHIES Gateway Client (spec §4.7, component C6): submits signed
//! bundles to the external platform with retry/backoff and a per-endpoint
//! circuit breaker, built on a plain `reqwest::Client`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use reqwest::StatusCode;
use uuid::Uuid;

use nphies_core::constants::{
    NPHIES_BACKOFF_BASE, NPHIES_BACKOFF_CAP, NPHIES_BACKOFF_FACTOR, NPHIES_BACKOFF_JITTER_PCT,
    NPHIES_BREAKER_COOLDOWN, NPHIES_BREAKER_FAILURE_RATE, NPHIES_BREAKER_WINDOW, NPHIES_CONNECT_TIMEOUT,
    NPHIES_MAX_ATTEMPTS, NPHIES_REQUEST_TIMEOUT,
};
use nphies_core::{ClaimId, GatewayAttemptRecord, GatewayLogWriter};
use nphies_envelope::ClaimError;

use crate::breaker::RateWindowBreaker;
use crate::idempotency::{derive_idempotency_key, hash_request_body};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub token: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_factor: u32,
    pub backoff_cap: Duration,
    pub backoff_jitter_pct: f64,
    pub breaker_window: usize,
    pub breaker_failure_rate: f64,
    pub breaker_cooldown: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        GatewayConfig {
            base_url: base_url.into(),
            token: token.into(),
            connect_timeout: NPHIES_CONNECT_TIMEOUT,
            request_timeout: NPHIES_REQUEST_TIMEOUT,
            max_attempts: NPHIES_MAX_ATTEMPTS,
            backoff_base: NPHIES_BACKOFF_BASE,
            backoff_factor: NPHIES_BACKOFF_FACTOR,
            backoff_cap: NPHIES_BACKOFF_CAP,
            backoff_jitter_pct: NPHIES_BACKOFF_JITTER_PCT,
            breaker_window: NPHIES_BREAKER_WINDOW,
            breaker_failure_rate: NPHIES_BREAKER_FAILURE_RATE,
            breaker_cooldown: NPHIES_BREAKER_COOLDOWN,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitResponse {
    pub upstream_txn_id: Option<String>,
    pub http_status: u16,
}

pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
    log_writer: Arc<dyn GatewayLogWriter>,
    breakers: Mutex<HashMap<String, RateWindowBreaker>>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig, log_writer: Arc<dyn GatewayLogWriter>) -> Result<Self, ClaimError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClaimError::internal("NPHIES_HTTP_CLIENT_BUILD_FAILED", e.to_string()))?;

        Ok(GatewayClient {
            http,
            config,
            log_writer,
            breakers: Mutex::new(HashMap::new()),
        })
    }

    fn breaker_key(facility_id: &str, endpoint: &str) -> String {
        format!("{facility_id}|{endpoint}")
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.config.backoff_factor.saturating_pow(attempt.saturating_sub(1));
        let base_ms = self.config.backoff_base.as_millis() as u64 * exp as u64;
        let capped_ms = base_ms.min(self.config.backoff_cap.as_millis() as u64);
        let jitter_range = (capped_ms as f64 * self.config.backoff_jitter_pct) as i64;
        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        Duration::from_millis((capped_ms as i64 + jitter).max(0) as u64)
    }

    /// Submit `body` to `{base_url}/{endpoint}` with retry/backoff and the
    /// breaker keyed on `(facility_id, endpoint)`. `kind` labels the attempt
    /// log row (e.g. "submit", "status").
    pub async fn submit(
        &self,
        claim_id: &ClaimId,
        facility_id: &str,
        endpoint: &str,
        kind: &str,
        body: Vec<u8>,
        correlation_id: Uuid,
    ) -> Result<SubmitResponse, ClaimError> {
        let key = Self::breaker_key(facility_id, endpoint);
        let request_hash = hash_request_body(&body);
        let idempotency_key = derive_idempotency_key(claim_id.as_ref(), kind, &request_hash);
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint);

        let mut last_err: Option<ClaimError> = None;

        for attempt in 1..=self.config.max_attempts {
            let now = Instant::now();
            let allowed = {
                let mut guard = self.breakers.lock();
                let breaker = guard
                    .entry(key.clone())
                    .or_insert_with(|| RateWindowBreaker::new(self.config.breaker_window, self.config.breaker_failure_rate, self.config.breaker_cooldown));
                breaker.allow(now)
            };
            if !allowed {
                return Err(ClaimError::upstream_unavailable(
                    "NPHIES_BREAKER_OPEN",
                    format!("circuit breaker open for {key}"),
                )
                .with_retryable(true)
                .with_correlation_id(nphies_envelope::CorrelationId::from_uuid(correlation_id)));
            }

            let started = Instant::now();
            let send_result = self
                .http
                .post(&url)
                .bearer_auth(&self.config.token)
                .header("Content-Type", "application/fhir+json")
                .header("X-Idempotency-Key", &idempotency_key)
                .header("X-Correlation-Id", correlation_id.to_string())
                .body(body.clone())
                .send()
                .await;

            let duration_ms = started.elapsed().as_millis() as i64;

            let outcome = match send_result {
                Ok(resp) => {
                    let status = resp.status();
                    let body_text = resp.text().await.unwrap_or_default();
                    let upstream_txn_id = serde_json::from_str::<serde_json::Value>(&body_text)
                        .ok()
                        .and_then(|v| v.get("upstream_txn_id").and_then(|t| t.as_str()).map(str::to_string));

                    self.log_attempt(claim_id, kind, attempt, &request_hash, upstream_txn_id.clone(), Some(status.as_u16()), duration_ms, None).await;

                    if status.is_success() {
                        Ok(SubmitResponse { upstream_txn_id, http_status: status.as_u16() })
                    } else if status.is_client_error() {
                        Err((false, ClaimError::upstream_rejected(
                            "NPHIES_UPSTREAM_REJECTED",
                            format!("gateway rejected with status {status}"),
                        )
                        .with_detail("response_body", nphies_envelope::sanitize::sanitize_body_for_log(&body_text))))
                    } else {
                        Err((true, ClaimError::upstream_unavailable(
                            "NPHIES_UPSTREAM_SERVER_ERROR",
                            format!("gateway returned status {status}"),
                        )
                        .with_detail("response_body", nphies_envelope::sanitize::sanitize_body_for_log(&body_text))))
                    }
                }
                Err(e) => {
                    let code = if e.is_timeout() { "NPHIES_TIMEOUT" } else { "NPHIES_TRANSPORT_ERROR" };
                    self.log_attempt(claim_id, kind, attempt, &request_hash, None, None, duration_ms, Some(code.to_string())).await;
                    Err((true, ClaimError::timeout(code, e.to_string())))
                }
            };

            match outcome {
                Ok(response) => {
                    self.breakers.lock().entry(key).or_insert_with(|| {
                        RateWindowBreaker::new(self.config.breaker_window, self.config.breaker_failure_rate, self.config.breaker_cooldown)
                    }).record_success(Instant::now());
                    return Ok(response);
                }
                Err((retryable, err)) => {
                    self.breakers.lock().entry(key.clone()).or_insert_with(|| {
                        RateWindowBreaker::new(self.config.breaker_window, self.config.breaker_failure_rate, self.config.breaker_cooldown)
                    }).record_failure(Instant::now());

                    let err = err.with_retryable(retryable).with_correlation_id(nphies_envelope::CorrelationId::from_uuid(correlation_id));
                    if !retryable || attempt == self.config.max_attempts {
                        return Err(err);
                    }
                    last_err = Some(err);
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ClaimError::internal("NPHIES_RETRY_LOOP_EXHAUSTED", "retry loop ended without a result")))
    }

    #[allow(clippy::too_many_arguments)]
    async fn log_attempt(
        &self,
        claim_id: &ClaimId,
        kind: &str,
        attempt: u32,
        request_hash: &str,
        upstream_txn_id: Option<String>,
        http_status: Option<u16>,
        duration_ms: i64,
        error_code: Option<String>,
    ) {
        let record = GatewayAttemptRecord {
            claim_id: claim_id.clone(),
            kind: kind.to_string(),
            attempt,
            request_hash: request_hash.to_string(),
            upstream_txn_id,
            http_status,
            duration_ms,
            error_code,
        };
        if let Err(e) = self.log_writer.record_attempt(record).await {
            tracing::warn!(error = %e, "failed to persist gateway attempt log row");
        }
    }
}

//! Pipeline Orchestrator (spec §4.8, component C7): drives one claim through
//! Normalize → Price → Sign → Submit, one struct holding every shared
//! dependency behind `Arc` and sequencing the four stages.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::Semaphore;

use nphies_core::claim::Claim;
use nphies_core::constants::{
    PIPELINE_INFLIGHT_MAX_DEFAULT, STAGE_DEADLINE_NORMALIZE, STAGE_DEADLINE_PRICE, STAGE_DEADLINE_SIGN,
    STAGE_DEADLINE_SUBMIT,
};
use nphies_core::types::ClaimId;
use nphies_core::{Stage, TransactionLogWriter, TransactionRecord, TransactionStatus};
use nphies_envelope::{ClaimError, CorrelationId};
use nphies_gateway::GatewayClient;
use nphies_normalizer::Normalizer;
use nphies_pricing::PricingService;
use nphies_signer::Signer;

use crate::canonicalize::canonicalize;
use crate::lock::PgAdvisoryLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ClaimStatus {
    Received,
    Normalizing,
    Pricing,
    Signing,
    Submitting,
    Submitted { upstream_txn_id: Option<String> },
    Failed { stage: Option<String>, error_code: String, message: String },
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_inflight: usize,
    pub stage_deadline_normalize: Duration,
    pub stage_deadline_price: Duration,
    pub stage_deadline_sign: Duration,
    pub stage_deadline_submit: Duration,
    /// Path segment appended to the gateway's `base_url` for claim submission.
    pub submit_endpoint: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            max_inflight: PIPELINE_INFLIGHT_MAX_DEFAULT,
            stage_deadline_normalize: STAGE_DEADLINE_NORMALIZE,
            stage_deadline_price: STAGE_DEADLINE_PRICE,
            stage_deadline_sign: STAGE_DEADLINE_SIGN,
            stage_deadline_submit: STAGE_DEADLINE_SUBMIT,
            submit_endpoint: "claims/submit".to_string(),
        }
    }
}

/// Holds every shared dependency the four stages need, wrapped once in
/// `Arc` and handed out to as many concurrent `process` calls as the
/// semaphore allows.
pub struct Pipeline {
    pool: PgPool,
    normalizer: Arc<Normalizer>,
    pricing: Arc<PricingService>,
    signer: Arc<Signer>,
    gateway: Arc<GatewayClient>,
    txn_log: Arc<dyn TransactionLogWriter>,
    semaphore: Arc<Semaphore>,
    statuses: Mutex<HashMap<ClaimId, ClaimStatus>>,
    config: PipelineConfig,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        normalizer: Arc<Normalizer>,
        pricing: Arc<PricingService>,
        signer: Arc<Signer>,
        gateway: Arc<GatewayClient>,
        txn_log: Arc<dyn TransactionLogWriter>,
        config: PipelineConfig,
    ) -> Self {
        Pipeline {
            pool,
            normalizer,
            pricing,
            signer,
            gateway,
            txn_log,
            semaphore: Arc::new(Semaphore::new(config.max_inflight)),
            statuses: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Last known status for `claim_id`, or `None` if this process has never
    /// seen it (the in-memory map does not survive a restart; durable
    /// history lives in the transaction log).
    pub fn status(&self, claim_id: &ClaimId) -> Option<ClaimStatus> {
        self.statuses.lock().get(claim_id).cloned()
    }

    /// Current number of claims the semaphore admits before new calls start
    /// failing `RATE_LIMITED` — exposed for the `/metrics` and `/readyz`
    /// endpoints.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    fn set_status(&self, claim_id: &ClaimId, status: ClaimStatus) {
        self.statuses.lock().insert(claim_id.clone(), status);
    }

    /// Drive `claim` through every stage. Returns the terminal status on
    /// success; on failure the error is also recorded as the claim's status
    /// before being returned to the caller.
    pub async fn process(&self, mut claim: Claim, correlation_id: CorrelationId) -> Result<ClaimStatus, ClaimError> {
        claim
            .validate()
            .map_err(|e| e.with_correlation_id(correlation_id))?;

        let _permit = self.semaphore.clone().try_acquire_owned().map_err(|_| {
            ClaimError::rate_limited(
                "ORCHESTRATOR_INFLIGHT_LIMIT",
                "too many claims are being processed concurrently",
            )
            .with_correlation_id(correlation_id)
        })?;

        self.set_status(&claim.claim_id, ClaimStatus::Received);

        let mut lock = match PgAdvisoryLock::try_acquire(&self.pool, claim.claim_id.as_ref()).await? {
            Some(lock) => lock,
            None => {
                let err = ClaimError::conflict(
                    "ORCHESTRATOR_CLAIM_IN_PROGRESS",
                    format!("claim {} is already being processed", claim.claim_id),
                )
                .with_correlation_id(correlation_id);
                self.set_status(&claim.claim_id, status_from_error(&err));
                return Err(err);
            }
        };

        let result = self.run_stages(&mut claim, correlation_id).await;
        lock.release().await;

        match result {
            Ok(status) => {
                self.set_status(&claim.claim_id, status.clone());
                Ok(status)
            }
            Err(err) => {
                self.set_status(&claim.claim_id, status_from_error(&err));
                Err(err)
            }
        }
    }

    async fn run_stages(&self, claim: &mut Claim, correlation_id: CorrelationId) -> Result<ClaimStatus, ClaimError> {
        self.set_status(&claim.claim_id, ClaimStatus::Normalizing);
        self.run_timed_stage(
            Stage::Normalize,
            &claim.claim_id,
            correlation_id,
            self.config.stage_deadline_normalize,
            async {
                for item in claim.line_items.iter_mut() {
                    let mapping = self
                        .normalizer
                        .normalize(claim.facility_id, &item.internal_code, item.description.as_deref())
                        .await?;
                    item.sbs_code = Some(mapping.sbs_code);
                }
                Ok(())
            },
        )
        .await?;

        self.set_status(&claim.claim_id, ClaimStatus::Pricing);
        let priced = self
            .run_timed_stage(
                Stage::Price,
                &claim.claim_id,
                correlation_id,
                self.config.stage_deadline_price,
                self.pricing.price(claim),
            )
            .await?;

        self.set_status(&claim.claim_id, ClaimStatus::Signing);
        let bundle_bytes = canonicalize(claim, &priced)?;
        let signed = self
            .run_timed_stage(
                Stage::Sign,
                &claim.claim_id,
                correlation_id,
                self.config.stage_deadline_sign,
                self.signer.sign(claim.facility_id, &bundle_bytes),
            )
            .await?;

        self.set_status(&claim.claim_id, ClaimStatus::Submitting);
        let bundle_b64 = base64::engine::general_purpose::STANDARD.encode(&bundle_bytes);
        let submission = SubmissionBody {
            bundle_b64: &bundle_b64,
            signature_b64: &signed.signature_b64,
            cert_serial: &signed.cert_serial,
            algorithm: &signed.algorithm,
        };
        let body = serde_json::to_vec(&submission)
            .map_err(|e| ClaimError::internal("ORCHESTRATOR_SUBMISSION_ENCODE_FAILED", e.to_string()))?;

        let facility_id = claim.facility_id.to_string();
        let response = self
            .run_timed_stage(
                Stage::Submit,
                &claim.claim_id,
                correlation_id,
                self.config.stage_deadline_submit,
                self.gateway.submit(
                    &claim.claim_id,
                    &facility_id,
                    &self.config.submit_endpoint,
                    "submit",
                    body,
                    correlation_id.as_uuid(),
                ),
            )
            .await?;

        Ok(ClaimStatus::Submitted {
            upstream_txn_id: response.upstream_txn_id,
        })
    }

    /// Wraps one stage's work with a `Started`/terminal pair of transaction
    /// log rows and a `tokio::time::timeout` against `deadline` (spec §4.8:
    /// "a stage that exceeds its deadline fails the claim with `TIMEOUT`,
    /// labeled with the stage it ran out of time in").
    async fn run_timed_stage<T>(
        &self,
        stage: Stage,
        claim_id: &ClaimId,
        correlation_id: CorrelationId,
        deadline: Duration,
        fut: impl Future<Output = Result<T, ClaimError>>,
    ) -> Result<T, ClaimError> {
        let started = TransactionRecord::started(claim_id.clone(), stage, correlation_id);
        self.write_txn_log(started.clone()).await;

        let outcome = match tokio::time::timeout(deadline, fut).await {
            Ok(Ok(value)) => {
                self.write_txn_log(started.terminal(TransactionStatus::Ok, None, None)).await;
                Ok(value)
            }
            Ok(Err(err)) => {
                let err = err.with_stage(stage.as_str()).with_correlation_id(correlation_id);
                self.write_txn_log(started.terminal(TransactionStatus::Failed, Some(err.code.clone()), None))
                    .await;
                Err(err)
            }
            Err(_) => {
                let err = ClaimError::timeout(
                    format!("ORCHESTRATOR_{}_TIMEOUT", stage.as_str().to_uppercase()),
                    format!("stage {stage} exceeded its {deadline:?} deadline"),
                )
                .with_retryable(true)
                .with_stage(stage.as_str())
                .with_correlation_id(correlation_id);
                self.write_txn_log(started.terminal(TransactionStatus::Failed, Some(err.code.clone()), None))
                    .await;
                Err(err)
            }
        };

        outcome
    }

    async fn write_txn_log(&self, record: TransactionRecord) {
        if let Err(e) = self.txn_log.write(record).await {
            tracing::warn!(error = %e, "failed to persist transaction log row");
        }
    }
}

#[derive(Serialize)]
struct SubmissionBody<'a> {
    bundle_b64: &'a str,
    signature_b64: &'a str,
    cert_serial: &'a str,
    algorithm: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_deadlines() {
        let config = PipelineConfig::default();
        assert_eq!(config.stage_deadline_normalize, STAGE_DEADLINE_NORMALIZE);
        assert_eq!(config.stage_deadline_submit, STAGE_DEADLINE_SUBMIT);
        assert_eq!(config.max_inflight, PIPELINE_INFLIGHT_MAX_DEFAULT);
    }

    #[test]
    fn status_from_error_carries_stage_and_code() {
        let err = ClaimError::conflict("ORCHESTRATOR_CLAIM_IN_PROGRESS", "already running").with_stage("sign");
        let status = status_from_error(&err);
        match status {
            ClaimStatus::Failed { stage, error_code, .. } => {
                assert_eq!(stage.as_deref(), Some("sign"));
                assert_eq!(error_code, "ORCHESTRATOR_CLAIM_IN_PROGRESS");
            }
            _ => panic!("expected Failed status"),
        }
    }
}

fn status_from_error(err: &ClaimError) -> ClaimStatus {
    ClaimStatus::Failed {
        stage: err.stage.clone(),
        error_code: err.code.clone(),
        message: err.message.clone(),
    }
}

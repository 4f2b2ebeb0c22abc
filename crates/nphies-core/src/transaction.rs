//! The append-only transaction audit log (spec §4.8, §6): one row per stage
//! attempt, written by the orchestrator as each stage starts and terminates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nphies_envelope::{ClaimError, CorrelationId};

use crate::types::ClaimId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Normalize,
    Price,
    Sign,
    Submit,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Normalize => "normalize",
            Stage::Price => "price",
            Stage::Sign => "sign",
            Stage::Submit => "submit",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, ClaimError> {
        match s {
            "normalize" => Ok(Stage::Normalize),
            "price" => Ok(Stage::Price),
            "sign" => Ok(Stage::Sign),
            "submit" => Ok(Stage::Submit),
            other => Err(ClaimError::data_corrupt(
                "TRANSACTION_UNKNOWN_STAGE",
                format!("unrecognized stage {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Started,
    Ok,
    Failed,
}

impl std::str::FromStr for TransactionStatus {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, ClaimError> {
        match s {
            "started" => Ok(TransactionStatus::Started),
            "ok" => Ok(TransactionStatus::Ok),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(ClaimError::data_corrupt(
                "TRANSACTION_UNKNOWN_STATUS",
                format!("unrecognized transaction status {other}"),
            )),
        }
    }
}

/// One row of the transaction log. Per spec §6, the orchestrator writes
/// exactly one `Started` row and exactly one terminal (`Ok`/`Failed`) row for
/// each `(claim_id, stage)` pair; a row is never mutated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub txn_id: Uuid,
    pub claim_id: ClaimId,
    pub stage: Stage,
    pub status: TransactionStatus,
    pub error_code: Option<String>,
    pub payload_hash: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub correlation_id: CorrelationId,
}

impl TransactionRecord {
    pub fn started(claim_id: ClaimId, stage: Stage, correlation_id: CorrelationId) -> Self {
        TransactionRecord {
            txn_id: Uuid::new_v4(),
            claim_id,
            stage,
            status: TransactionStatus::Started,
            error_code: None,
            payload_hash: None,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            correlation_id,
        }
    }

    /// Build the terminal row that closes out a `Started` row with the same
    /// `txn_id`. The orchestrator persists both rows independently; this just
    /// computes the fields a successful or failed completion carries.
    pub fn terminal(
        &self,
        status: TransactionStatus,
        error_code: Option<String>,
        payload_hash: Option<String>,
    ) -> Self {
        let ended_at = Utc::now();
        let duration_ms = (ended_at - self.started_at).num_milliseconds();
        TransactionRecord {
            txn_id: self.txn_id,
            claim_id: self.claim_id.clone(),
            stage: self.stage,
            status,
            error_code,
            payload_hash,
            started_at: self.started_at,
            ended_at: Some(ended_at),
            duration_ms: Some(duration_ms),
            correlation_id: self.correlation_id,
        }
    }
}

/// One row of the NPHIES gateway's own attempt log (spec §4.7): persisted
/// even on failure so a claim's retry history is fully reconstructable.
/// Implemented by `nphies-catalogue` against the same pool the rest of the
/// catalogue uses; kept here (rather than in `nphies-gateway`) so the trait
/// has no dependency on the HTTP client that produces the records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayAttemptRecord {
    pub claim_id: ClaimId,
    pub kind: String,
    pub attempt: u32,
    pub request_hash: String,
    pub upstream_txn_id: Option<String>,
    pub http_status: Option<u16>,
    pub duration_ms: i64,
    pub error_code: Option<String>,
}

#[async_trait]
pub trait GatewayLogWriter: Send + Sync {
    async fn record_attempt(&self, record: GatewayAttemptRecord) -> Result<(), ClaimError>;
}

/// Persists [`TransactionRecord`] rows. The orchestrator calls this once per
/// `Started` row and once per terminal row; implementations must not mutate
/// an existing row (spec §6's append-only requirement).
#[async_trait]
pub trait TransactionLogWriter: Send + Sync {
    async fn write(&self, record: TransactionRecord) -> Result<(), ClaimError>;
}

/// Read side of the transaction log, used by the Submission API's
/// `GET /claim/{claim_id}` projection (spec §4.8 — `Status(claim_id) →
/// {stages, current, terminal_status}`) to reconstruct a claim's full stage
/// history, including across a process restart where the orchestrator's
/// in-memory status map would otherwise have no answer.
#[async_trait]
pub trait TransactionHistoryReader: Send + Sync {
    async fn history(&self, claim_id: &ClaimId) -> Result<Vec<TransactionRecord>, ClaimError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_row_shares_txn_id_with_started_row() {
        let started = TransactionRecord::started(
            ClaimId("CLM-1".into()),
            Stage::Price,
            CorrelationId::new(),
        );
        let ok = started.terminal(TransactionStatus::Ok, None, Some("abc".into()));
        assert_eq!(ok.txn_id, started.txn_id);
        assert!(matches!(ok.status, TransactionStatus::Ok));
        assert!(ok.ended_at.is_some());
    }

    #[test]
    fn stage_display_matches_wire_form() {
        assert_eq!(Stage::Normalize.to_string(), "normalize");
        assert_eq!(Stage::Submit.as_str(), "submit");
    }

    #[test]
    fn stage_round_trips_through_str() {
        use std::str::FromStr;
        for stage in [Stage::Normalize, Stage::Price, Stage::Sign, Stage::Submit] {
            assert_eq!(Stage::from_str(stage.as_str()).unwrap(), stage);
        }
        assert!(Stage::from_str("bogus").is_err());
    }
}

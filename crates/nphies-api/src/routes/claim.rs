//! `POST /claim` and `GET /claim/{claim_id}` (spec §4.9): submit a claim into
//! the pipeline and read back its stage-by-stage history.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use nphies_core::claim::Claim;
use nphies_core::transaction::{Stage, TransactionRecord, TransactionStatus};
use nphies_core::types::ClaimId;
use nphies_envelope::{ClaimError, CorrelationId};

use crate::error::error_response;
use crate::state::AppState;

#[derive(Serialize)]
struct AcceptedResponse {
    claim_id: String,
    accepted_at: DateTime<Utc>,
    tracking_url: String,
}

/// Parses the body as a [`Claim`] itself rather than relying on axum's `Json`
/// extractor, so a malformed body produces the same error envelope as every
/// other failure instead of axum's plain-text rejection.
pub async fn submit_claim(State(state): State<AppState>, body: Bytes) -> Response {
    state.metrics.record_request();
    let correlation_id = CorrelationId::new();

    let claim: Claim = match serde_json::from_slice(&body) {
        Ok(claim) => claim,
        Err(e) => {
            state.metrics.record_failure();
            return error_response(
                ClaimError::invalid_input("API_BODY_NOT_CLAIM", e.to_string()).with_correlation_id(correlation_id),
                "/claim",
            );
        }
    };

    if let Err(e) = claim.validate() {
        state.metrics.record_failure();
        return error_response(e.with_correlation_id(correlation_id), "/claim");
    }

    let claim_id = claim.claim_id.clone();
    match state.pipeline.process(claim, correlation_id).await {
        Ok(_status) => {
            state.metrics.record_claim_accepted();
            let response = AcceptedResponse {
                claim_id: claim_id.to_string(),
                accepted_at: Utc::now(),
                tracking_url: format!("/claim/{claim_id}"),
            };
            (StatusCode::ACCEPTED, Json(response)).into_response()
        }
        Err(e) => {
            state.metrics.record_failure();
            error_response(e, "/claim")
        }
    }
}

#[derive(Serialize)]
struct StageProjection {
    stage: String,
    status: String,
    error_code: Option<String>,
}

#[derive(Serialize)]
struct StatusResponse {
    claim_id: String,
    stages: Vec<StageProjection>,
    current: String,
    terminal_status: String,
}

const STAGE_ORDER: [Stage; 4] = [Stage::Normalize, Stage::Price, Stage::Sign, Stage::Submit];

/// Projects the raw append-only log into `{stages, current, terminal_status}`
/// (spec §4.8). Each stage keeps only its latest row, since a stage can be
/// retried and its rows re-written as `Started` then a terminal status.
fn project(claim_id: &ClaimId, rows: &[TransactionRecord]) -> StatusResponse {
    let mut stages = Vec::new();
    let mut last_failed_stage: Option<Stage> = None;
    let mut submit_ok = false;

    for stage in STAGE_ORDER {
        let latest = rows.iter().filter(|r| r.stage == stage).max_by_key(|r| r.started_at);
        if let Some(record) = latest {
            stages.push(StageProjection {
                stage: stage.as_str().to_string(),
                status: status_str(record.status).to_string(),
                error_code: record.error_code.clone(),
            });
            match record.status {
                TransactionStatus::Failed => last_failed_stage = Some(stage),
                TransactionStatus::Ok if stage == Stage::Submit => submit_ok = true,
                _ => {}
            }
        }
    }

    let current = rows
        .iter()
        .max_by_key(|r| r.started_at)
        .map(|r| r.stage.as_str().to_string())
        .unwrap_or_default();

    let terminal_status = if submit_ok {
        "submitted".to_string()
    } else if let Some(stage) = last_failed_stage {
        format!("failed:{}", stage.as_str())
    } else {
        "in_progress".to_string()
    };

    StatusResponse {
        claim_id: claim_id.to_string(),
        stages,
        current,
        terminal_status,
    }
}

fn status_str(status: TransactionStatus) -> &'static str {
    match status {
        TransactionStatus::Started => "started",
        TransactionStatus::Ok => "ok",
        TransactionStatus::Failed => "failed",
    }
}

pub async fn get_claim_status(State(state): State<AppState>, Path(claim_id): Path<String>) -> Response {
    state.metrics.record_request();
    let claim_id = ClaimId(claim_id);

    let rows = match state.history_reader.history(&claim_id).await {
        Ok(rows) => rows,
        Err(e) => {
            state.metrics.record_failure();
            return error_response(e, "/claim");
        }
    };

    if rows.is_empty() {
        state.metrics.record_failure();
        return error_response(
            ClaimError::not_found(
                "API_CLAIM_NOT_FOUND",
                format!("no transaction history for claim {claim_id}"),
            ),
            "/claim",
        );
    }

    Json(project(&claim_id, &rows)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nphies_envelope::CorrelationId;
    use uuid::Uuid;

    fn record(stage: Stage, status: TransactionStatus, offset_s: i64) -> TransactionRecord {
        TransactionRecord {
            txn_id: Uuid::nil(),
            claim_id: ClaimId("CLM-1".into()),
            stage,
            status,
            error_code: None,
            payload_hash: None,
            started_at: Utc::now() + chrono::Duration::seconds(offset_s),
            ended_at: None,
            duration_ms: None,
            correlation_id: CorrelationId::new(),
        }
    }

    #[test]
    fn projects_submitted_when_submit_stage_ok() {
        let rows = vec![
            record(Stage::Normalize, TransactionStatus::Ok, 0),
            record(Stage::Price, TransactionStatus::Ok, 1),
            record(Stage::Sign, TransactionStatus::Ok, 2),
            record(Stage::Submit, TransactionStatus::Ok, 3),
        ];
        let projected = project(&ClaimId("CLM-1".into()), &rows);
        assert_eq!(projected.terminal_status, "submitted");
        assert_eq!(projected.current, "submit");
        assert_eq!(projected.stages.len(), 4);
    }

    #[test]
    fn projects_failed_stage_as_terminal() {
        let rows = vec![
            record(Stage::Normalize, TransactionStatus::Ok, 0),
            record(Stage::Price, TransactionStatus::Failed, 1),
        ];
        let projected = project(&ClaimId("CLM-1".into()), &rows);
        assert_eq!(projected.terminal_status, "failed:price");
    }

    #[test]
    fn later_retry_overwrites_earlier_attempt_for_same_stage() {
        let rows = vec![
            record(Stage::Normalize, TransactionStatus::Failed, 0),
            record(Stage::Normalize, TransactionStatus::Ok, 1),
        ];
        let projected = project(&ClaimId("CLM-1".into()), &rows);
        assert_eq!(projected.stages.len(), 1);
        assert_eq!(projected.stages[0].status, "ok");
    }
}

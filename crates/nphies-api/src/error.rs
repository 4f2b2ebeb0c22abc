//! The standard error envelope at the API boundary (spec §6, §7): every
//! non-2xx response is `{error, error_code, error_id, timestamp, status,
//! path, details}`, built once here from a [`ClaimError`] so handlers never
//! hand-assemble an error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use nphies_envelope::ClaimError;

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub error_code: String,
    pub error_id: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub status: u16,
    pub path: String,
    pub details: std::collections::BTreeMap<String, String>,
}

pub fn error_response(err: ClaimError, path: &str) -> Response {
    let status = StatusCode::from_u16(err.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let error_id = err
        .correlation_id
        .map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    tracing::warn!(
        error_code = %err.code,
        error_id = %error_id,
        stage = ?err.stage,
        "request failed"
    );

    let envelope = ErrorEnvelope {
        error: err.message,
        error_code: err.code,
        error_id,
        timestamp: Utc::now(),
        status: status.as_u16(),
        path: path.to_string(),
        details: err.details,
    };

    (status, Json(envelope)).into_response()
}

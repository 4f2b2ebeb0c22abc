//! The error taxonomy (spec §4.1, §7): a single error shape shared by every
//! component. Each component attaches its own stable `code` string but the
//! `kind` enum, `retryable` classification, and sanitization rules live here
//! exactly once — one error type that every crate in the workspace converts
//! into, never its own bespoke error shape.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::correlation::CorrelationId;

/// The closed taxonomy of failure kinds a pipeline operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    UpstreamUnavailable,
    UpstreamRejected,
    Timeout,
    RateLimited,
    Conflict,
    Internal,
    DataCorrupt,
}

impl ErrorKind {
    /// Whether the envelope classifies this kind as safe to retry.
    /// `UPSTREAM_UNAVAILABLE` and `TIMEOUT` are retryable; `UPSTREAM_REJECTED`,
    /// `INVALID_INPUT`, and `CONFLICT` are not. Everything else defaults to
    /// non-retryable unless a call site overrides it explicitly.
    pub fn default_retryable(self) -> bool {
        matches!(self, ErrorKind::UpstreamUnavailable | ErrorKind::Timeout)
    }

    /// The HTTP status this kind maps to at the API boundary (spec §7).
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::InvalidInput => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::RateLimited => 429,
            ErrorKind::UpstreamUnavailable | ErrorKind::Timeout => 503,
            ErrorKind::UpstreamRejected => 502,
            ErrorKind::Internal | ErrorKind::DataCorrupt => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            ErrorKind::UpstreamRejected => "UPSTREAM_REJECTED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::DataCorrupt => "DATA_CORRUPT",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A sanitized, structured failure shared by every pipeline operation.
///
/// Construct with [`ClaimError::new`] then chain `.with_*` builders. Never
/// construct two layers of this type for the same failure (the propagation
/// policy in spec §7 forbids double-wrapping) — a stage that receives a
/// `ClaimError` from a component should relabel it with `.with_stage(..)`
/// rather than wrap it in a fresh one.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ClaimError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub correlation_id: Option<CorrelationId>,
    pub retryable: bool,
    pub details: BTreeMap<String, String>,
    /// Name of the stage the error surfaced in, set once by the orchestrator.
    pub stage: Option<String>,
    #[source]
    pub cause: Option<Box<ClaimError>>,
}

impl ClaimError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        let retryable = kind.default_retryable();
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            correlation_id: None,
            retryable,
            details: BTreeMap::new(),
            stage: None,
            cause: None,
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, code, message)
    }

    pub fn invalid_input(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, code, message)
    }

    pub fn upstream_unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamUnavailable, code, message)
    }

    pub fn upstream_rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamRejected, code, message)
    }

    pub fn timeout(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, code, message)
    }

    pub fn rate_limited(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, code, message)
    }

    pub fn data_corrupt(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DataCorrupt, code, message)
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = crate::sanitize::sanitize_detail(&key, &value.into());
        self.details.insert(key, value);
        self
    }

    /// Labels this error with the stage it surfaced in. The orchestrator
    /// calls this exactly once per failure (spec §7: "the orchestrator
    /// surfaces the first failure unchanged and labels it with `stage`").
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_cause(mut self, cause: ClaimError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ClaimResult<T> = Result<T, ClaimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retryable_matches_taxonomy() {
        assert!(ErrorKind::UpstreamUnavailable.default_retryable());
        assert!(ErrorKind::Timeout.default_retryable());
        assert!(!ErrorKind::UpstreamRejected.default_retryable());
        assert!(!ErrorKind::InvalidInput.default_retryable());
        assert!(!ErrorKind::Conflict.default_retryable());
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(ErrorKind::InvalidInput.http_status(), 400);
        assert_eq!(ErrorKind::NotFound.http_status(), 404);
        assert_eq!(ErrorKind::Conflict.http_status(), 409);
        assert_eq!(ErrorKind::RateLimited.http_status(), 429);
        assert_eq!(ErrorKind::UpstreamRejected.http_status(), 502);
        assert_eq!(ErrorKind::UpstreamUnavailable.http_status(), 503);
        assert_eq!(ErrorKind::Internal.http_status(), 500);
    }

    #[test]
    fn builder_chain_sets_fields() {
        let id = CorrelationId::new();
        let err = ClaimError::not_found("NORMALIZER_NOT_FOUND", "no mapping")
            .with_correlation_id(id)
            .with_stage("normalizing")
            .with_detail("facility_id", "12");
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.stage.as_deref(), Some("normalizing"));
        assert_eq!(err.correlation_id, Some(id));
        assert_eq!(err.details.get("facility_id").unwrap(), "12");
    }
}

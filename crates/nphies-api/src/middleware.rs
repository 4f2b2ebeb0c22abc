//! Request guards applied before the handler (spec §4.9): a size/depth guard
//! followed by a per-`(client_ip, route_class)` rate limiter, both rejecting
//! with the standard error envelope rather than a bare HTTP status.

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, State};
use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;

use nphies_envelope::ClaimError;

use crate::error::error_response;
use crate::state::AppState;

/// Buffers the body up to `limits.request_body_bytes + 1`, rejects oversized
/// or over-deep JSON, then reconstructs the request so the handler can parse
/// it again unburdened by guard logic (spec §6: "rejected ... before
/// parsing").
pub async fn body_guard_middleware(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let limit = state.config.limits.request_body_bytes;

    let bytes = match to_bytes(body, limit + 1).await {
        Ok(b) => b,
        Err(e) => return error_response(ClaimError::invalid_input("API_BODY_UNREADABLE", e.to_string()), &path),
    };

    if bytes.len() > limit {
        return error_response(
            ClaimError::invalid_input("API_BODY_TOO_LARGE", format!("request body exceeds {limit} bytes")),
            &path,
        );
    }

    if !bytes.is_empty() {
        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(value) => {
                let depth = json_depth(&value);
                if depth > state.config.limits.depth_max {
                    return error_response(
                        ClaimError::invalid_input(
                            "API_BODY_TOO_DEEP",
                            format!("request body nesting depth {depth} exceeds {}", state.config.limits.depth_max),
                        ),
                        &path,
                    );
                }
            }
            Err(e) => {
                return error_response(ClaimError::invalid_input("API_BODY_NOT_JSON", e.to_string()), &path);
            }
        }
    }

    let req = Request::from_parts(parts, Body::from(bytes));
    next.run(req).await
}

fn json_depth(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Object(map) => 1 + map.values().map(json_depth).max().unwrap_or(0),
        serde_json::Value::Array(items) => 1 + items.iter().map(json_depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Per-IP, per-route-class limiting (spec §4.9: 100 rpm `/claim`, 300 rpm
/// status). Falls back to the literal string `"unknown"` when no
/// `ConnectInfo` is present (e.g. behind a misconfigured proxy) rather than
/// failing open.
pub async fn rate_limit_middleware(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let is_claim_route = path.starts_with("/claim") && req.method() == Method::POST;

    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|c| c.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let (limiter, route_class) = if is_claim_route {
        (&state.claim_rate_limiter, "claim")
    } else {
        (&state.status_rate_limiter, "status")
    };

    let key = format!("{ip}|{route_class}");
    let decision = limiter.allow(&key);
    if !decision.allowed {
        state.metrics.record_rate_limited();
        let err = ClaimError::rate_limited("API_RATE_LIMITED", "too many requests for this client")
            .with_detail("retry_after_ms", decision.retry_after_ms.to_string());
        return error_response(err, &path);
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_counts_nested_objects_and_arrays() {
        let value: serde_json::Value = serde_json::json!({"a": {"b": [1, 2, {"c": 3}]}});
        assert_eq!(json_depth(&value), 3);
    }

    #[test]
    fn depth_of_scalar_is_zero() {
        let value = serde_json::Value::from(42);
        assert_eq!(json_depth(&value), 0);
    }
}

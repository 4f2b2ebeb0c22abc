//! Input validation primitives (spec §4.1): depth/size caps on decoded
//! payloads, numeric range checks, and regex-style identifier checks. Every
//! rejection names the offending field so the caller can point the user at
//! the exact problem, matching spec §6's `details{}` requirement.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ClaimError;

pub const DEFAULT_MAX_DEPTH: usize = 10;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

static NATIONAL_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{10}$").unwrap());
static FACILITY_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9][0-9]{0,9}$").unwrap());
static SBS_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^SBS-[A-Z0-9]{3,4}-[A-Z0-9]{3,6}$").unwrap());
static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9]{9,15}$").unwrap());

fn field_error(field: &str, message: impl Into<String>) -> ClaimError {
    ClaimError::invalid_input("ENVELOPE_INVALID_FIELD", message).with_detail("field", field)
}

/// Reject a decoded JSON payload whose nesting exceeds `max_depth`.
pub fn validate_depth(value: &serde_json::Value, max_depth: usize) -> Result<(), ClaimError> {
    fn depth_of(value: &serde_json::Value) -> usize {
        match value {
            serde_json::Value::Object(map) => {
                1 + map.values().map(depth_of).max().unwrap_or(0)
            }
            serde_json::Value::Array(items) => {
                1 + items.iter().map(depth_of).max().unwrap_or(0)
            }
            _ => 0,
        }
    }
    let depth = depth_of(value);
    if depth > max_depth {
        return Err(field_error(
            "$",
            format!("payload nesting depth {depth} exceeds maximum {max_depth}"),
        ));
    }
    Ok(())
}

/// Reject a raw request body larger than `max_bytes`.
pub fn validate_size(body: &[u8], max_bytes: usize) -> Result<(), ClaimError> {
    if body.len() > max_bytes {
        return Err(field_error(
            "$",
            format!("payload size {} exceeds maximum {max_bytes} bytes", body.len()),
        ));
    }
    Ok(())
}

pub fn validate_national_id(field: &str, value: &str) -> Result<(), ClaimError> {
    if !NATIONAL_ID.is_match(value) {
        return Err(field_error(field, "national_id must be exactly 10 digits"));
    }
    Ok(())
}

pub fn validate_facility_id(field: &str, value: &str) -> Result<(), ClaimError> {
    if !FACILITY_ID.is_match(value) {
        return Err(field_error(field, "facility_id must be a positive integer"));
    }
    Ok(())
}

pub fn validate_sbs_code(field: &str, value: &str) -> Result<(), ClaimError> {
    if !SBS_CODE.is_match(value) {
        return Err(field_error(field, "sbs_code does not match the SBS-xxx-xxx catalogue format"));
    }
    Ok(())
}

pub fn validate_phone(field: &str, value: &str) -> Result<(), ClaimError> {
    if !PHONE.is_match(value) {
        return Err(field_error(field, "phone must be 9-15 digits, optionally prefixed with +"));
    }
    Ok(())
}

pub fn validate_range_u32(field: &str, value: u32, min: u32, max: u32) -> Result<(), ClaimError> {
    if value < min || value > max {
        return Err(field_error(
            field,
            format!("value {value} out of range [{min}, {max}]"),
        ));
    }
    Ok(())
}

pub fn validate_non_negative_i64(field: &str, value: i64) -> Result<(), ClaimError> {
    if value < 0 {
        return Err(field_error(field, "value must be >= 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn depth_within_limit_passes() {
        let v = json!({"a": {"b": {"c": 1}}});
        assert!(validate_depth(&v, 10).is_ok());
    }

    #[test]
    fn depth_exceeding_limit_fails() {
        let mut v = json!(1);
        for _ in 0..15 {
            v = json!({ "n": v });
        }
        let err = validate_depth(&v, 10).unwrap_err();
        assert_eq!(err.details.get("field").unwrap(), "$");
    }

    #[test]
    fn national_id_requires_ten_digits() {
        assert!(validate_national_id("patient.national_id", "1234567890").is_ok());
        assert!(validate_national_id("patient.national_id", "12345").is_err());
        assert!(validate_national_id("patient.national_id", "12345abcde").is_err());
    }

    #[test]
    fn sbs_code_format() {
        assert!(validate_sbs_code("line_items[0].sbs_code", "SBS-123-456").is_ok());
        assert!(validate_sbs_code("line_items[0].sbs_code", "NOT-A-CODE").is_err());
    }
}

//! Idempotency key derivation for outbound NPHIES submissions (spec §4.7):
//! `sha256(claim_id || kind || request_hash)`, hex-encoded.

use sha2::{Digest, Sha256};

pub fn derive_idempotency_key(claim_id: &str, kind: &str, request_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(claim_id.as_bytes());
    hasher.update(kind.as_bytes());
    hasher.update(request_hash.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn hash_request_body(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

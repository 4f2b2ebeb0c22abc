//! NPHIES Gateway Client (spec §4.7, component C6): retrying, circuit-broken
//! HTTP submission to the external claims platform.

pub mod breaker;
pub mod client;
pub mod idempotency;

pub use breaker::RateWindowBreaker;
pub use client::{GatewayClient, GatewayConfig, SubmitResponse};
pub use idempotency::{derive_idempotency_key, hash_request_body};

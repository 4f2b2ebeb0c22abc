//! Spec-mandated defaults (spec §4 throughout), collected in one place so
//! every component pulls its timeouts, TTLs, and thresholds from the same
//! source.

use std::time::Duration;

// ── Cache TTLs (§4.4) ──────────────────────────────────────────────────────
pub const CACHE_TTL_SBS_DB: Duration = Duration::from_secs(60 * 60);
pub const CACHE_TTL_SBS_AI: Duration = Duration::from_secs(5 * 60);
pub const CACHE_TTL_TIER: Duration = Duration::from_secs(60 * 60);
pub const SHARED_CACHE_READ_BUDGET: Duration = Duration::from_millis(50);

// ── AI / circuit breaker (§4.4) ────────────────────────────────────────────
pub const AI_DEFAULT_CONFIDENCE: f64 = 0.75;
pub const BREAKER_FAILURE_THRESHOLD: u32 = 5;
pub const BREAKER_FAILURE_WINDOW: Duration = Duration::from_secs(60);
pub const BREAKER_COOLDOWN: Duration = Duration::from_secs(30);

// ── NPHIES gateway transport (§4.7) ────────────────────────────────────────
pub const NPHIES_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const NPHIES_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const NPHIES_BACKOFF_BASE: Duration = Duration::from_millis(500);
pub const NPHIES_BACKOFF_FACTOR: u32 = 2;
pub const NPHIES_BACKOFF_CAP: Duration = Duration::from_secs(5);
pub const NPHIES_MAX_ATTEMPTS: u32 = 3;
pub const NPHIES_BACKOFF_JITTER_PCT: f64 = 0.25;
pub const NPHIES_BREAKER_WINDOW: usize = 30;
pub const NPHIES_BREAKER_FAILURE_RATE: f64 = 0.5;
pub const NPHIES_BREAKER_COOLDOWN: Duration = Duration::from_secs(15);

// ── Pool sizing (§4.2) ─────────────────────────────────────────────────────
pub const DB_POOL_MIN_DEFAULT: u32 = 1;
pub const DB_POOL_MAX_DEFAULT: u32 = 20;
pub const NPHIES_POOL_MIN_DEFAULT: u32 = 2;
pub const NPHIES_POOL_MAX_DEFAULT: u32 = 30;

// ── Orchestrator stage deadlines (§4.8) ────────────────────────────────────
pub const STAGE_DEADLINE_NORMALIZE: Duration = Duration::from_secs(15);
pub const STAGE_DEADLINE_PRICE: Duration = Duration::from_secs(5);
pub const STAGE_DEADLINE_SIGN: Duration = Duration::from_secs(10);
pub const STAGE_DEADLINE_SUBMIT: Duration = Duration::from_secs(45);
pub const STAGE_ABANDON_GRACE: Duration = Duration::from_secs(2);
pub const PIPELINE_INFLIGHT_MAX_DEFAULT: usize = 200;

// ── Rate limiting (§4.1, §4.9) ─────────────────────────────────────────────
pub const RATE_LIMIT_CLAIM_RPM_DEFAULT: u32 = 100;
pub const RATE_LIMIT_STATUS_RPM_DEFAULT: u32 = 300;
pub const RATE_LIMIT_TRACKED_KEYS_MAX_DEFAULT: usize = 10_000;
pub const RATE_LIMIT_CLEANUP_DEFAULT: Duration = Duration::from_secs(5 * 60);

// ── Request body limits (§6) ───────────────────────────────────────────────
pub const REQUEST_BODY_BYTES_MAX_DEFAULT: usize = 1024 * 1024;
pub const REQUEST_DEPTH_MAX_DEFAULT: usize = 10;

// ── Signer (§4.6) ──────────────────────────────────────────────────────────
pub const SIGNER_ALGORITHM: &str = "SHA256withRSA";
pub const SIGNER_MIN_RSA_BITS: usize = 2048;
pub const CERT_CACHE_MAX_DEFAULT: usize = 256;

//! Shared Envelope (spec §4.1, component C8): the error taxonomy, correlation
//! IDs, the process-wide rate limiter, input validation primitives, and the
//! credential sanitizer. Every other crate in the workspace depends on this
//! one; it depends on nothing internal.

pub mod correlation;
pub mod error;
pub mod rate_limit;
pub mod sanitize;
pub mod validate;

pub use correlation::CorrelationId;
pub use error::{ClaimError, ClaimResult, ErrorKind};
pub use rate_limit::{RateLimitConfig, RateLimiter};

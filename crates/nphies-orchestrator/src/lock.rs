//! Per-claim mutual exclusion across orchestrator instances (spec §4.8):
//! a Postgres session-level advisory lock held on a dedicated connection
//! for the duration of one claim's pipeline run.

use sha2::{Digest, Sha256};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

use nphies_envelope::ClaimError;

/// Derive the `pg_try_advisory_lock` key from a claim_id: the first 8 bytes
/// of its SHA-256 digest, reinterpreted as a signed i64 (Postgres advisory
/// lock keys are bigint, so negative values are fine).
pub fn lock_key(claim_id: &str) -> i64 {
    let digest = Sha256::digest(claim_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

/// A held advisory lock. The connection is explicitly closed on drop-path
/// (via [`PgAdvisoryLock::release`]) rather than returned to the pool,
/// because returning it would hand the still-locked session to the next
/// borrower and leak the lock.
pub struct PgAdvisoryLock {
    conn: Option<PoolConnection<Postgres>>,
    key: i64,
}

impl PgAdvisoryLock {
    /// Attempt to acquire the lock for `claim_id`. Returns `Ok(None)` if
    /// another worker already holds it (the caller maps this to a
    /// `CONFLICT` error), `Err` only on a genuine connection/query failure.
    pub async fn try_acquire(pool: &PgPool, claim_id: &str) -> Result<Option<Self>, ClaimError> {
        let key = lock_key(claim_id);
        let mut conn = pool.acquire().await.map_err(|e| {
            ClaimError::upstream_unavailable("ORCHESTRATOR_LOCK_CONNECT_FAILED", e.to_string())
        })?;

        let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| ClaimError::upstream_unavailable("ORCHESTRATOR_LOCK_QUERY_FAILED", e.to_string()))?;

        if !acquired.0 {
            // Connection never held the lock; safe to return to the pool.
            return Ok(None);
        }

        Ok(Some(PgAdvisoryLock { conn: Some(conn), key }))
    }

    /// Release the lock and close the underlying connection. Idempotent:
    /// a second call is a no-op.
    pub async fn release(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let _ = sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(self.key)
                .execute(&mut *conn)
                .await;
            conn.close().await.ok();
        }
    }
}

impl Drop for PgAdvisoryLock {
    fn drop(&mut self) {
        if self.conn.is_some() {
            tracing::warn!(
                key = self.key,
                "advisory lock dropped without explicit release; connection closed without unlocking"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_deterministic() {
        assert_eq!(lock_key("CLM-1"), lock_key("CLM-1"));
        assert_ne!(lock_key("CLM-1"), lock_key("CLM-2"));
    }
}

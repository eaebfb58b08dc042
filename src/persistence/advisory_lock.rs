//! Advisory locks
//!
//! Cooperative, non-blocking mutual exclusion over an `advisory_locks`
//! table: INSERT ON CONFLICT DO NOTHING is the try-acquire. The lock key
//! is a SHA-256 hash of the (user, strategy, symbol) triple truncated to
//! i64, so unrelated trading keys never contend through collisions.
//!
//! Acquisition is scoped: [`AdvisoryLockGuard`] releases on drop if the
//! caller did not release explicitly, so no exit path leaks the lock.

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{DatabaseError, DbPool};

/// Locks older than this are considered leaked by a dead process and are
/// reclaimed on the next acquisition attempt.
const LOCK_EXPIRY_MS: i64 = 30_000;

/// Derive the i64 lock key for a trading key.
pub fn lock_key(user_id: &str, strategy_id: &str, symbol: &str) -> i64 {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(strategy_id.as_bytes());
    hasher.update(b":");
    hasher.update(symbol.as_bytes());
    let digest = hasher.finalize();
    i64::from_be_bytes(digest[..8].try_into().unwrap_or([0u8; 8]))
}

/// Manager for table-backed advisory locks.
#[derive(Clone)]
pub struct AdvisoryLockManager {
    pool: DbPool,
}

impl AdvisoryLockManager {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Non-blocking acquisition. Returns a guard on success, `None` on
    /// contention. Expired locks left by dead holders are reclaimed first.
    pub async fn try_acquire(
        &self,
        key: i64,
        holder: &str,
    ) -> Result<Option<AdvisoryLockGuard>, DatabaseError> {
        let expiry_cutoff = Utc::now() - Duration::milliseconds(LOCK_EXPIRY_MS);
        sqlx::query("DELETE FROM advisory_locks WHERE lock_key = ?1 AND acquired_at < ?2")
            .bind(key)
            .bind(expiry_cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("Failed to expire lock: {}", e)))?;

        let rows = sqlx::query(
            "INSERT INTO advisory_locks (lock_key, holder, acquired_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(lock_key) DO NOTHING",
        )
        .bind(key)
        .bind(holder)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("Failed to acquire lock: {}", e)))?
        .rows_affected();

        if rows == 1 {
            debug!("Acquired advisory lock {} for {}", key, holder);
            Ok(Some(AdvisoryLockGuard {
                pool: self.pool.clone(),
                key,
                holder: holder.to_string(),
                released: false,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Scoped lock. Call [`release`](Self::release) on the happy path; the
/// Drop impl is the safety net for early returns and errors.
pub struct AdvisoryLockGuard {
    pool: DbPool,
    key: i64,
    holder: String,
    released: bool,
}

impl AdvisoryLockGuard {
    /// Explicit release. Failures are reported to the caller so they can
    /// be logged; the already-decided outcome does not change.
    pub async fn release(mut self) -> Result<(), DatabaseError> {
        self.released = true;
        release_row(&self.pool, self.key, &self.holder).await
    }
}

impl Drop for AdvisoryLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            "Advisory lock {} dropped without explicit release, releasing in background",
            self.key
        );
        let pool = self.pool.clone();
        let key = self.key;
        let holder = self.holder.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = release_row(&pool, key, &holder).await {
                    warn!("Background release of advisory lock {} failed: {}", key, e);
                }
            });
        }
    }
}

async fn release_row(pool: &DbPool, key: i64, holder: &str) -> Result<(), DatabaseError> {
    let rows = sqlx::query("DELETE FROM advisory_locks WHERE lock_key = ?1 AND holder = ?2")
        .bind(key)
        .bind(holder)
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("Failed to release lock: {}", e)))?
        .rows_affected();

    if rows == 0 {
        warn!("Advisory lock {} was not held by {} at release", key, holder);
    } else {
        debug!("Released advisory lock {} for {}", key, holder);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;

    #[test]
    fn test_lock_key_distinguishes_triples() {
        let a = lock_key("u1", "s1", "BTC");
        let b = lock_key("u1", "s1", "ETH");
        let c = lock_key("u1", "s2", "BTC");
        let d = lock_key("u2", "s1", "BTC");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        // Deterministic
        assert_eq!(a, lock_key("u1", "s1", "BTC"));
    }

    #[tokio::test]
    async fn test_try_acquire_contention_and_release() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let manager = AdvisoryLockManager::new(pool);
        let key = lock_key("u1", "s1", "BTC");

        let guard = manager.try_acquire(key, "holder_a").await.unwrap();
        assert!(guard.is_some());

        // Second acquisition fails while held
        let contended = manager.try_acquire(key, "holder_b").await.unwrap();
        assert!(contended.is_none());

        guard.unwrap().release().await.unwrap();

        // Free again after release
        let reacquired = manager.try_acquire(key, "holder_b").await.unwrap();
        assert!(reacquired.is_some());
        reacquired.unwrap().release().await.unwrap();
    }

    #[tokio::test]
    async fn test_independent_keys_do_not_contend() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let manager = AdvisoryLockManager::new(pool);

        let g1 = manager
            .try_acquire(lock_key("u1", "s1", "BTC"), "h1")
            .await
            .unwrap();
        let g2 = manager
            .try_acquire(lock_key("u1", "s1", "ETH"), "h2")
            .await
            .unwrap();
        assert!(g1.is_some());
        assert!(g2.is_some());
        g1.unwrap().release().await.unwrap();
        g2.unwrap().release().await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_lock_is_reclaimed() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let manager = AdvisoryLockManager::new(pool.clone());
        let key = lock_key("u1", "s1", "BTC");

        // Plant a stale lock row from a dead holder
        let stale = Utc::now() - Duration::milliseconds(LOCK_EXPIRY_MS + 1_000);
        sqlx::query("INSERT INTO advisory_locks (lock_key, holder, acquired_at) VALUES (?1, ?2, ?3)")
            .bind(key)
            .bind("dead_holder")
            .bind(stale)
            .execute(&pool)
            .await
            .unwrap();

        let guard = manager.try_acquire(key, "alive").await.unwrap();
        assert!(guard.is_some());
        guard.unwrap().release().await.unwrap();
    }
}

//! Decision cache - absorbs duplicate/retried intents
//!
//! Time-bounded map from idempotency key to the previously issued decision.
//! Best effort: a miss just means recomputation, never an error. Reads use
//! `peek` so a lookup never refreshes the TTL and the LRU order stays equal
//! to insertion order.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::domain::entities::decision::TradeDecision;
use crate::domain::entities::intent::TradeIntent;

/// Replay window for cached decisions.
const CACHE_TTL: Duration = Duration::from_secs(30);
/// Eviction trigger: once this many entries exist...
const MAX_ENTRIES: usize = 1000;
/// ...retain only this many most recently inserted.
const RETAIN_ENTRIES: usize = 500;

struct CachedDecision {
    decision: TradeDecision,
    inserted_at: Instant,
}

/// In-process idempotency cache, shared across request-handling tasks.
/// Operations are pure map work; nothing blocks while the mutex is held.
pub struct DecisionCache {
    inner: Mutex<LruCache<String, CachedDecision>>,
    ttl: Duration,
}

impl DecisionCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            // Capacity is enforced manually (bulk evict to RETAIN_ENTRIES),
            // so the cache itself is sized above the trigger point.
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(MAX_ENTRIES * 2).expect("cache capacity is non-zero"),
            )),
            ttl,
        }
    }

    /// Deterministic idempotency key: the intent's own key if supplied,
    /// otherwise a hash over (user, strategy, symbol, side, source, second
    /// bucket). Requests differing only in milliseconds collapse to one.
    pub fn derive_key(&self, intent: &TradeIntent, now: DateTime<Utc>) -> String {
        if let Some(key) = &intent.idempotency_key {
            return key.clone();
        }

        let bucket = intent.client_timestamp.unwrap_or(now).timestamp();
        let mut hasher = Sha256::new();
        hasher.update(intent.user_id.as_bytes());
        hasher.update(b"|");
        hasher.update(intent.strategy_id.as_bytes());
        hasher.update(b"|");
        hasher.update(intent.symbol.as_bytes());
        hasher.update(b"|");
        hasher.update(intent.side.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(intent.source.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(bucket.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    /// Return the cached decision if it was inserted within the TTL.
    pub fn get(&self, key: &str) -> Option<TradeDecision> {
        let cache = self.inner.lock().ok()?;
        let cached = cache.peek(key)?;
        if cached.inserted_at.elapsed() > self.ttl {
            return None;
        }
        Some(cached.decision.clone())
    }

    /// Store a decision. Does not extend any existing TTL semantics; a
    /// re-put of the same key restarts its window (the decision is the same).
    pub fn put(&self, key: String, decision: TradeDecision) {
        let Ok(mut cache) = self.inner.lock() else {
            return;
        };
        cache.put(
            key,
            CachedDecision {
                decision,
                inserted_at: Instant::now(),
            },
        );

        if cache.len() > MAX_ENTRIES {
            while cache.len() > RETAIN_ENTRIES {
                cache.pop_lru();
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::decision::DecisionReason;
    use crate::domain::entities::intent::{IntentSource, TradeSide};

    fn intent() -> TradeIntent {
        TradeIntent {
            user_id: "u1".to_string(),
            strategy_id: "s1".to_string(),
            symbol: "BTC".to_string(),
            side: TradeSide::Buy,
            source: IntentSource::Automated,
            confidence: 0.5,
            reason: None,
            qty_suggested: None,
            metadata: None,
            client_timestamp: None,
            idempotency_key: None,
        }
    }

    #[test]
    fn test_key_collapses_same_second() {
        let cache = DecisionCache::new();
        let base = Utc::now();
        let mut a = intent();
        let mut b = intent();
        a.client_timestamp = Some(base);
        b.client_timestamp = Some(base + chrono::Duration::milliseconds(400));

        // Same second bucket unless the millisecond offset crosses a boundary
        if a.client_timestamp.unwrap().timestamp() == b.client_timestamp.unwrap().timestamp() {
            assert_eq!(cache.derive_key(&a, base), cache.derive_key(&b, base));
        }

        b.client_timestamp = Some(base + chrono::Duration::seconds(2));
        assert_ne!(cache.derive_key(&a, base), cache.derive_key(&b, base));
    }

    #[test]
    fn test_key_sensitive_to_all_fields() {
        let cache = DecisionCache::new();
        let now = Utc::now();
        let a = intent();

        let mut b = intent();
        b.side = TradeSide::Sell;
        b.qty_suggested = Some(1.0);
        assert_ne!(cache.derive_key(&a, now), cache.derive_key(&b, now));

        let mut c = intent();
        c.source = IntentSource::Whale;
        assert_ne!(cache.derive_key(&a, now), cache.derive_key(&c, now));

        let mut d = intent();
        d.symbol = "ETH".to_string();
        assert_ne!(cache.derive_key(&a, now), cache.derive_key(&d, now));
    }

    #[test]
    fn test_supplied_key_wins() {
        let cache = DecisionCache::new();
        let mut i = intent();
        i.idempotency_key = Some("caller-key".to_string());
        assert_eq!(cache.derive_key(&i, Utc::now()), "caller-key");
    }

    #[test]
    fn test_put_get_roundtrip() {
        let cache = DecisionCache::new();
        let d = TradeDecision::hold("req_1", DecisionReason::BlockedByCooldown);
        cache.put("k1".to_string(), d.clone());
        assert_eq!(cache.get("k1"), Some(d));
        assert_eq!(cache.get("unknown"), None);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = DecisionCache::with_ttl(Duration::from_millis(0));
        cache.put(
            "k1".to_string(),
            TradeDecision::hold("req_1", DecisionReason::NoConflictsDetected),
        );
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k1"), None);
    }

    #[test]
    fn test_bulk_eviction_retains_most_recent() {
        let cache = DecisionCache::new();
        for i in 0..=MAX_ENTRIES {
            cache.put(
                format!("k{}", i),
                TradeDecision::hold(format!("req_{}", i), DecisionReason::NoConflictsDetected),
            );
        }
        assert_eq!(cache.len(), RETAIN_ENTRIES);
        // The newest insert survives, the oldest is gone
        assert!(cache.get(&format!("k{}", MAX_ENTRIES)).is_some());
        assert!(cache.get("k0").is_none());
    }
}

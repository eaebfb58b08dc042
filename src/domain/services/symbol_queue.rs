//! Symbol micro-queue - in-process admission control
//!
//! Bounds the number of concurrently in-flight intents per
//! (user, strategy, symbol) key to 2; anything beyond is shed immediately
//! with a jittered DEFER. This is back-pressure, not a correctness lock;
//! mutual exclusion for the atomic section is the advisory lock's job.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::Rng;

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Overloaded,
}

pub struct SymbolQueue {
    // symbol key -> idempotency keys of in-flight intents
    inner: Mutex<HashMap<String, Vec<String>>>,
}

impl SymbolQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Admit an intent unless two are already in flight for the key.
    pub fn admit(&self, symbol_key: &str, idempotency_key: &str) -> Admission {
        let Ok(mut map) = self.inner.lock() else {
            return Admission::Overloaded;
        };
        let entry = map.entry(symbol_key.to_string()).or_default();
        if entry.len() > 1 {
            return Admission::Overloaded;
        }
        entry.push(idempotency_key.to_string());
        Admission::Admitted
    }

    /// Current in-flight count for a key.
    pub fn length(&self, symbol_key: &str) -> usize {
        self.inner
            .lock()
            .map(|map| map.get(symbol_key).map(|v| v.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Remove an admitted intent, dropping the key's list once empty.
    pub fn release(&self, symbol_key: &str, idempotency_key: &str) {
        let Ok(mut map) = self.inner.lock() else {
            return;
        };
        if let Some(entry) = map.get_mut(symbol_key) {
            if let Some(pos) = entry.iter().position(|k| k == idempotency_key) {
                entry.remove(pos);
            }
            if entry.is_empty() {
                map.remove(symbol_key);
            }
        }
    }
}

impl Default for SymbolQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniform retry jitter for DEFER responses.
pub fn retry_jitter_ms(min_ms: u64, max_ms: u64) -> u64 {
    rand::thread_rng().gen_range(min_ms..=max_ms)
}

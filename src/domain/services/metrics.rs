//! Coordinator metrics counters

use std::time::SystemTime;

use serde::Serialize;

/// Running counters for coordinator activity, shared behind a mutex and
/// exposed at GET /metrics.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorMetrics {
    pub decisions_total: u64,
    pub cache_hits: u64,
    pub executed_trades: u64,
    pub holds: u64,
    pub defers_queue_overload: u64,
    pub defers_lock_busy: u64,
    pub defers_price_gate: u64,
    pub defers_profit_gate: u64,
    pub conflicts_detected: u64,
    pub tp_triggers: u64,
    pub direct_path_decisions: u64,
    #[serde(skip)]
    pub last_updated: SystemTime,
}

impl Default for CoordinatorMetrics {
    fn default() -> Self {
        Self {
            decisions_total: 0,
            cache_hits: 0,
            executed_trades: 0,
            holds: 0,
            defers_queue_overload: 0,
            defers_lock_busy: 0,
            defers_price_gate: 0,
            defers_profit_gate: 0,
            conflicts_detected: 0,
            tp_triggers: 0,
            direct_path_decisions: 0,
            last_updated: SystemTime::now(),
        }
    }
}

impl CoordinatorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&mut self) {
        self.last_updated = SystemTime::now();
    }
}

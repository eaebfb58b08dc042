//! Trade decision - the arbitrated, authoritative outcome for an intent

use serde::{Deserialize, Serialize};

/// Authoritative action taken for an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionAction {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "HOLD")]
    Hold,
    #[serde(rename = "DEFER")]
    Defer,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Buy => "BUY",
            DecisionAction::Sell => "SELL",
            DecisionAction::Hold => "HOLD",
            DecisionAction::Defer => "DEFER",
        }
    }
}

/// Closed enumeration of decision reasons. Callers switch on the wire
/// string, so these names are part of the API contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionReason {
    #[serde(rename = "unified_decisions_disabled_direct_path")]
    UnifiedDecisionsDisabledDirectPath,
    #[serde(rename = "no_conflicts_detected")]
    NoConflictsDetected,
    #[serde(rename = "hold_min_period_not_met")]
    HoldMinPeriodNotMet,
    #[serde(rename = "blocked_by_cooldown")]
    BlockedByCooldown,
    #[serde(rename = "blocked_by_precedence:POOL_EXIT")]
    BlockedByPoolExitPrecedence,
    #[serde(rename = "queue_overload_defer")]
    QueueOverloadDefer,
    #[serde(rename = "direct_execution_failed")]
    DirectExecutionFailed,
    #[serde(rename = "internal_error")]
    InternalError,
    #[serde(rename = "atomic_section_busy_defer")]
    AtomicSectionBusyDefer,
    #[serde(rename = "insufficient_price_freshness")]
    InsufficientPriceFreshness,
    #[serde(rename = "spread_too_wide")]
    SpreadTooWide,
    #[serde(rename = "blocked_by_insufficient_profit")]
    BlockedByInsufficientProfit,
    #[serde(rename = "tp_hit")]
    TpHit,
    #[serde(rename = "confidence_override_applied")]
    ConfidenceOverrideApplied,
    #[serde(rename = "manual_override_precedence")]
    ManualOverridePrecedence,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::UnifiedDecisionsDisabledDirectPath => {
                "unified_decisions_disabled_direct_path"
            }
            DecisionReason::NoConflictsDetected => "no_conflicts_detected",
            DecisionReason::HoldMinPeriodNotMet => "hold_min_period_not_met",
            DecisionReason::BlockedByCooldown => "blocked_by_cooldown",
            DecisionReason::BlockedByPoolExitPrecedence => "blocked_by_precedence:POOL_EXIT",
            DecisionReason::QueueOverloadDefer => "queue_overload_defer",
            DecisionReason::DirectExecutionFailed => "direct_execution_failed",
            DecisionReason::InternalError => "internal_error",
            DecisionReason::AtomicSectionBusyDefer => "atomic_section_busy_defer",
            DecisionReason::InsufficientPriceFreshness => "insufficient_price_freshness",
            DecisionReason::SpreadTooWide => "spread_too_wide",
            DecisionReason::BlockedByInsufficientProfit => "blocked_by_insufficient_profit",
            DecisionReason::TpHit => "tp_hit",
            DecisionReason::ConfidenceOverrideApplied => "confidence_override_applied",
            DecisionReason::ManualOverridePrecedence => "manual_override_precedence",
        }
    }
}

/// Outcome of arbitration for a single intent. Constructed once, cached
/// under the idempotency key for the cache window, replayed verbatim on
/// duplicate submissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub action: DecisionAction,
    pub reason: DecisionReason,
    pub request_id: String,
    /// Suggested back-off, only meaningful for DEFER
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
    /// Filled quantity, only present on executed BUY/SELL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qty: Option<f64>,
    /// Diagnostic payload (e.g. which profit-gate sub-conditions failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl TradeDecision {
    pub fn hold(request_id: impl Into<String>, reason: DecisionReason) -> Self {
        Self {
            action: DecisionAction::Hold,
            reason,
            request_id: request_id.into(),
            retry_in_ms: None,
            qty: None,
            metadata: None,
        }
    }

    pub fn defer(request_id: impl Into<String>, reason: DecisionReason, retry_in_ms: u64) -> Self {
        Self {
            action: DecisionAction::Defer,
            reason,
            request_id: request_id.into(),
            retry_in_ms: Some(retry_in_ms),
            qty: None,
            metadata: None,
        }
    }

    pub fn executed(
        request_id: impl Into<String>,
        action: DecisionAction,
        reason: DecisionReason,
        qty: f64,
    ) -> Self {
        Self {
            action,
            reason,
            request_id: request_id.into(),
            retry_in_ms: None,
            qty: Some(qty),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_wire_strings() {
        let json = serde_json::to_string(&DecisionReason::BlockedByPoolExitPrecedence).unwrap();
        assert_eq!(json, "\"blocked_by_precedence:POOL_EXIT\"");

        let json = serde_json::to_string(&DecisionReason::QueueOverloadDefer).unwrap();
        assert_eq!(json, "\"queue_overload_defer\"");

        let back: DecisionReason = serde_json::from_str("\"tp_hit\"").unwrap();
        assert_eq!(back, DecisionReason::TpHit);
    }

    #[test]
    fn test_defer_carries_retry_hint() {
        let d = TradeDecision::defer("req_1", DecisionReason::AtomicSectionBusyDefer, 350);
        assert_eq!(d.action, DecisionAction::Defer);
        assert_eq!(d.retry_in_ms, Some(350));
        assert!(d.qty.is_none());
    }

    #[test]
    fn test_executed_carries_qty() {
        let d = TradeDecision::executed(
            "req_2",
            DecisionAction::Buy,
            DecisionReason::NoConflictsDetected,
            0.001,
        );
        assert_eq!(d.qty, Some(0.001));
        assert!(d.retry_in_ms.is_none());
    }

    #[test]
    fn test_hold_serializes_without_optionals() {
        let d = TradeDecision::hold("req_3", DecisionReason::BlockedByCooldown);
        let json = serde_json::to_string(&d).unwrap();
        assert!(!json.contains("retry_in_ms"));
        assert!(!json.contains("qty"));
        assert!(json.contains("blocked_by_cooldown"));
    }
}

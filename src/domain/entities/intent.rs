//! Trade intent - a proposed trade awaiting arbitration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side of a proposed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    pub fn opposite(&self) -> TradeSide {
        match self {
            TradeSide::Buy => TradeSide::Sell,
            TradeSide::Sell => TradeSide::Buy,
        }
    }
}

/// Origin of a trade intent, ordered here roughly by precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Automated,
    Intelligent,
    Pool,
    Manual,
    News,
    Whale,
    /// Synthetic exits produced by the coordinator's take-profit trigger
    CoordinatorTp,
}

impl IntentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentSource::Automated => "automated",
            IntentSource::Intelligent => "intelligent",
            IntentSource::Pool => "pool",
            IntentSource::Manual => "manual",
            IntentSource::News => "news",
            IntentSource::Whale => "whale",
            IntentSource::CoordinatorTp => "coordinator_tp",
        }
    }

    /// Sources allowed to override an opposite-action cooldown when their
    /// confidence clears the strategy's override threshold.
    pub fn can_override_cooldown(&self) -> bool {
        matches!(
            self,
            IntentSource::Intelligent | IntentSource::News | IntentSource::Whale
        )
    }
}

/// A request to trade, immutable once its idempotency key is derived.
/// Only its effects (trade rows, decision-log rows) are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    pub user_id: String,
    pub strategy_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub source: IntentSource,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qty_suggested: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl TradeIntent {
    /// Structural validation. Failures surface as 400s, never retried.
    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("user_id is required".to_string());
        }
        if self.strategy_id.trim().is_empty() {
            return Err("strategy_id is required".to_string());
        }
        if self.symbol.trim().is_empty() {
            return Err("symbol is required".to_string());
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "confidence {} out of range [0,1]",
                self.confidence
            ));
        }
        if let Some(qty) = self.qty_suggested {
            if !qty.is_finite() || qty <= 0.0 {
                return Err(format!("qty_suggested {} must be positive", qty));
            }
        }
        if self.side == TradeSide::Sell && self.qty_suggested.is_none() {
            return Err("SELL intents require qty_suggested".to_string());
        }
        Ok(())
    }

    /// Per-(user, strategy, symbol) trading key used for queue admission
    /// and advisory-lock derivation.
    pub fn symbol_key(&self) -> String {
        format!("{}:{}:{}", self.user_id, self.strategy_id, self.symbol)
    }
}

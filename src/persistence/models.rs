//! Row models for the persistence layer

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::domain::entities::strategy::{ProfitAwareConfig, StrategyConfig, UnifiedConfig};

/// Raw strategies row. Nullable tuning columns get their named defaults
/// applied exactly once, in [`StrategyRow::materialize`].
#[derive(Debug, Clone, FromRow)]
pub struct StrategyRow {
    pub id: String,
    pub user_id: String,
    pub enable_unified_decisions: bool,
    pub min_hold_period_ms: Option<i64>,
    pub cooldown_between_opposite_actions_ms: Option<i64>,
    pub confidence_override_threshold: Option<f64>,
    pub take_profit_percentage: Option<f64>,
    pub stop_loss_percentage: Option<f64>,
    pub min_edge_bps_for_exit: Option<f64>,
    pub min_profit_eur_for_exit: Option<f64>,
    pub confidence_threshold_for_exit: Option<f64>,
    pub is_system_operator: bool,
}

impl StrategyRow {
    pub fn materialize(self) -> StrategyConfig {
        let unified_defaults = UnifiedConfig::default();
        let profit_defaults = ProfitAwareConfig::default();

        StrategyConfig {
            strategy_id: self.id,
            user_id: self.user_id,
            enable_unified_decisions: self.enable_unified_decisions,
            unified: UnifiedConfig {
                min_hold_period_ms: self
                    .min_hold_period_ms
                    .unwrap_or(unified_defaults.min_hold_period_ms),
                cooldown_between_opposite_actions_ms: self
                    .cooldown_between_opposite_actions_ms
                    .unwrap_or(unified_defaults.cooldown_between_opposite_actions_ms),
                confidence_override_threshold: self
                    .confidence_override_threshold
                    .unwrap_or(unified_defaults.confidence_override_threshold),
            },
            profit: ProfitAwareConfig {
                take_profit_percentage: self
                    .take_profit_percentage
                    .unwrap_or(profit_defaults.take_profit_percentage),
                stop_loss_percentage: self
                    .stop_loss_percentage
                    .unwrap_or(profit_defaults.stop_loss_percentage),
                min_edge_bps_for_exit: self
                    .min_edge_bps_for_exit
                    .unwrap_or(profit_defaults.min_edge_bps_for_exit),
                min_profit_eur_for_exit: self
                    .min_profit_eur_for_exit
                    .unwrap_or(profit_defaults.min_profit_eur_for_exit),
                confidence_threshold_for_exit: self
                    .confidence_threshold_for_exit
                    .unwrap_or(profit_defaults.confidence_threshold_for_exit),
            },
            is_system_operator: self.is_system_operator,
        }
    }
}

/// Ledger row. Exactly one per executed decision.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TradeRecord {
    pub id: String,
    pub user_id: String,
    pub strategy_id: Option<String>,
    pub symbol: String,
    /// "buy" or "sell"
    pub side: String,
    pub amount: f64,
    pub price: f64,
    pub total_value: f64,
    /// For SELL rows: the buy-lot amount this sale consumed (FIFO)
    pub original_purchase_amount: Option<f64>,
    /// Provenance: "direct", "arbitrated" or "coordinator_tp"
    pub decision_path: String,
    pub request_id: String,
    pub executed_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn is_buy(&self) -> bool {
        self.side == "buy"
    }

    /// Signed ledger value: BUYs consume balance, SELLs replenish it.
    pub fn signed_value(&self) -> f64 {
        if self.is_buy() {
            -self.total_value
        } else {
            self.total_value
        }
    }
}

/// Insert DTO for a new trade row.
#[derive(Debug, Clone)]
pub struct CreateTrade {
    pub user_id: String,
    pub strategy_id: Option<String>,
    pub symbol: String,
    pub side: String,
    pub amount: f64,
    pub price: f64,
    pub total_value: f64,
    pub original_purchase_amount: Option<f64>,
    pub decision_path: String,
    pub request_id: String,
}

/// Insert DTO for a decision-log row (fire-and-forget audit).
#[derive(Debug, Clone)]
pub struct CreateDecisionLog {
    pub request_id: String,
    pub user_id: String,
    pub strategy_id: String,
    pub symbol: String,
    pub side: String,
    pub source: String,
    pub action: String,
    pub reason: String,
    pub confidence: f64,
    pub metadata: Option<String>,
}

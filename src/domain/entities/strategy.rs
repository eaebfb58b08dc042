//! Strategy configuration as seen by the coordinator (read-only)

/// Arbitration settings for one strategy. Defaults are applied once when
/// the persistence layer materializes the record, never at call sites.
#[derive(Debug, Clone)]
pub struct UnifiedConfig {
    pub min_hold_period_ms: i64,
    pub cooldown_between_opposite_actions_ms: i64,
    pub confidence_override_threshold: f64,
}

impl Default for UnifiedConfig {
    fn default() -> Self {
        Self {
            min_hold_period_ms: 300_000,
            cooldown_between_opposite_actions_ms: 120_000,
            confidence_override_threshold: 0.75,
        }
    }
}

/// Profit-aware exit settings, used only in arbitrated SELL evaluation.
#[derive(Debug, Clone)]
pub struct ProfitAwareConfig {
    pub take_profit_percentage: f64,
    pub stop_loss_percentage: f64,
    pub min_edge_bps_for_exit: f64,
    pub min_profit_eur_for_exit: f64,
    pub confidence_threshold_for_exit: f64,
}

impl Default for ProfitAwareConfig {
    fn default() -> Self {
        Self {
            take_profit_percentage: 5.0,
            stop_loss_percentage: 3.0,
            min_edge_bps_for_exit: 20.0,
            min_profit_eur_for_exit: 1.0,
            confidence_threshold_for_exit: 0.6,
        }
    }
}

/// Fully materialized strategy configuration.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub strategy_id: String,
    pub user_id: String,
    /// Mode switch: true = arbitrated, false = direct
    pub enable_unified_decisions: bool,
    pub unified: UnifiedConfig,
    pub profit: ProfitAwareConfig,
    /// Operator-owned strategies write trade rows with strategy_id = NULL;
    /// ownership and strategy attribution are mutually exclusive.
    pub is_system_operator: bool,
}

impl StrategyConfig {
    /// strategy_id to stamp on ledger rows produced under this config.
    pub fn ledger_strategy_id(&self) -> Option<&str> {
        if self.is_system_operator {
            None
        } else {
            Some(&self.strategy_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_strategies_detach_attribution() {
        let mut cfg = StrategyConfig {
            strategy_id: "s1".to_string(),
            user_id: "u1".to_string(),
            enable_unified_decisions: true,
            unified: UnifiedConfig::default(),
            profit: ProfitAwareConfig::default(),
            is_system_operator: true,
        };
        assert_eq!(cfg.ledger_strategy_id(), None);

        cfg.is_system_operator = false;
        assert_eq!(cfg.ledger_strategy_id(), Some("s1"));
    }
}

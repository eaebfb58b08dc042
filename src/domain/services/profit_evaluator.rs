//! Position & profit evaluator
//!
//! FIFO cost-basis reconstruction plus the two SELL-side evaluations:
//! the take-profit auto-trigger (pre-lock, arbitrated mode only) and the
//! profit gate for explicit SELL intents (inside the locked section).
//! Positions are derived per evaluation and never cached.

use serde_json::json;

use crate::domain::entities::strategy::ProfitAwareConfig;
use crate::persistence::models::TradeRecord;

const QTY_EPSILON: f64 = 1e-9;

/// One unconsumed buy lot.
#[derive(Debug, Clone, Copy)]
struct Lot {
    qty: f64,
    price: f64,
}

/// Remaining FIFO position for one (user, strategy, symbol) key.
#[derive(Debug, Clone)]
pub struct FifoPosition {
    lots: Vec<Lot>,
}

impl FifoPosition {
    /// Rebuild the open position from the full trade history, oldest
    /// first. SELL rows consume the oldest lots via their recorded
    /// original purchase amount.
    pub fn reconstruct(trades_oldest_first: &[TradeRecord]) -> Self {
        let mut lots: Vec<Lot> = Vec::new();

        for trade in trades_oldest_first {
            if trade.is_buy() {
                lots.push(Lot {
                    qty: trade.amount,
                    price: trade.price,
                });
            } else {
                let mut to_consume = trade.original_purchase_amount.unwrap_or(trade.amount);
                while to_consume > QTY_EPSILON {
                    let Some(front) = lots.first_mut() else {
                        break;
                    };
                    if front.qty > to_consume + QTY_EPSILON {
                        front.qty -= to_consume;
                        to_consume = 0.0;
                    } else {
                        to_consume -= front.qty;
                        lots.remove(0);
                    }
                }
            }
        }

        Self { lots }
    }

    pub fn remaining_qty(&self) -> f64 {
        self.lots.iter().map(|l| l.qty).sum()
    }

    /// Weighted-average cost of the whole remaining position.
    pub fn avg_cost(&self) -> Option<f64> {
        let qty = self.remaining_qty();
        if qty <= QTY_EPSILON {
            return None;
        }
        let notional: f64 = self.lots.iter().map(|l| l.qty * l.price).sum();
        Some(notional / qty)
    }

    /// Weighted-average cost of exactly `qty`, consumed from the oldest
    /// lots. Returns the matched quantity alongside the cost (the match
    /// may be partial if the position is smaller than `qty`).
    pub fn cost_basis_for(&self, qty: f64) -> Option<(f64, f64)> {
        if qty <= QTY_EPSILON {
            return None;
        }
        let mut remaining = qty;
        let mut matched = 0.0;
        let mut notional = 0.0;
        for lot in &self.lots {
            if remaining <= QTY_EPSILON {
                break;
            }
            let take = lot.qty.min(remaining);
            matched += take;
            notional += take * lot.price;
            remaining -= take;
        }
        if matched <= QTY_EPSILON {
            return None;
        }
        Some((notional / matched, matched))
    }
}

/// Take-profit auto-trigger: if unrealized gain on the remaining position
/// reaches the threshold, exit the entire remaining size. The caller tags
/// the synthetic intent `coordinator_tp` and still runs it through the
/// hold-period and cooldown gates.
pub fn take_profit_trigger(
    position: &FifoPosition,
    current_price: f64,
    config: &ProfitAwareConfig,
) -> Option<f64> {
    let avg_cost = position.avg_cost()?;
    let gain_pct = (current_price - avg_cost) / avg_cost * 100.0;
    if gain_pct >= config.take_profit_percentage {
        Some(position.remaining_qty())
    } else {
        None
    }
}

/// Result of the explicit-SELL profit gate.
#[derive(Debug, Clone)]
pub struct ProfitGateResult {
    pub allowed: bool,
    pub pnl_eur: f64,
    pub pnl_pct: f64,
    pub edge_bps: f64,
    /// Sub-conditions that failed, for operator diagnosis
    pub failed: Vec<String>,
}

impl ProfitGateResult {
    pub fn to_metadata(&self) -> serde_json::Value {
        json!({
            "pnl_eur": self.pnl_eur,
            "pnl_pct": self.pnl_pct,
            "edge_bps": self.edge_bps,
            "failed_conditions": self.failed,
        })
    }
}

/// Gate an explicit SELL of `qty` at `price`. Allowed when take-profit or
/// stop-loss is hit, or when edge, EUR profit and confidence all clear
/// their minimums.
pub fn evaluate_sell_gate(
    position: &FifoPosition,
    qty: f64,
    price: f64,
    confidence: f64,
    config: &ProfitAwareConfig,
) -> ProfitGateResult {
    let Some((cost, matched_qty)) = position.cost_basis_for(qty) else {
        return ProfitGateResult {
            allowed: false,
            pnl_eur: 0.0,
            pnl_pct: 0.0,
            edge_bps: 0.0,
            failed: vec!["no_open_position".to_string()],
        };
    };

    let pnl_eur = (price - cost) * matched_qty;
    let pnl_pct = (price - cost) / cost * 100.0;
    let edge_bps = pnl_pct.abs() * 100.0;

    if pnl_pct >= config.take_profit_percentage {
        return ProfitGateResult {
            allowed: true,
            pnl_eur,
            pnl_pct,
            edge_bps,
            failed: Vec::new(),
        };
    }
    if pnl_pct <= -config.stop_loss_percentage {
        return ProfitGateResult {
            allowed: true,
            pnl_eur,
            pnl_pct,
            edge_bps,
            failed: Vec::new(),
        };
    }

    let mut failed = Vec::new();
    if edge_bps < config.min_edge_bps_for_exit {
        failed.push(format!(
            "edge_bps {:.2} < min {:.2}",
            edge_bps, config.min_edge_bps_for_exit
        ));
    }
    if pnl_eur < config.min_profit_eur_for_exit {
        failed.push(format!(
            "pnl_eur {:.2} < min {:.2}",
            pnl_eur, config.min_profit_eur_for_exit
        ));
    }
    if confidence < config.confidence_threshold_for_exit {
        failed.push(format!(
            "confidence {:.2} < min {:.2}",
            confidence, config.confidence_threshold_for_exit
        ));
    }

    ProfitGateResult {
        allowed: failed.is_empty(),
        pnl_eur,
        pnl_pct,
        edge_bps,
        failed,
    }
}

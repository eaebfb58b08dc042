//! Atomic executor
//!
//! The short critical section that runs under the advisory lock: re-check
//! price freshness and spread (the lock wait itself can stale the quote),
//! size the order against the running balance, and write exactly one trade
//! row. Lock acquisition and release belong to the coordinator; this
//! service assumes it is already inside the critical section.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::CoordinatorConfig;
use crate::domain::entities::intent::TradeSide;
use crate::domain::entities::strategy::StrategyConfig;
use crate::domain::errors::ExecutionError;
use crate::domain::repositories::price_oracle::PriceOracle;
use crate::domain::services::profit_evaluator::{evaluate_sell_gate, FifoPosition};
use crate::domain::value_objects::quantity::Quantity;
use crate::persistence::models::CreateTrade;
use crate::persistence::repository::TradeRepository;

/// Which path produced an execution; stamped on the ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionPath {
    Direct,
    Arbitrated,
    CoordinatorTp,
}

impl DecisionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionPath::Direct => "direct",
            DecisionPath::Arbitrated => "arbitrated",
            DecisionPath::CoordinatorTp => "coordinator_tp",
        }
    }
}

/// Inputs to one execution attempt.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub user_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub qty_suggested: Option<f64>,
    pub confidence: f64,
    pub request_id: String,
    pub path: DecisionPath,
    /// Direct-mode BUYs skip the price gates; everything else re-checks.
    pub enforce_price_gates: bool,
    /// Explicit arbitrated SELLs pass the profit gate; TP-synthesized and
    /// manual/direct sells do not.
    pub apply_profit_gate: bool,
}

/// A successfully written trade.
#[derive(Debug, Clone)]
pub struct ExecutedTrade {
    pub qty: f64,
    pub price: f64,
    pub total_value: f64,
}

pub struct AtomicExecutor {
    oracle: Arc<dyn PriceOracle>,
    trades: TradeRepository,
    config: CoordinatorConfig,
}

impl AtomicExecutor {
    pub fn new(
        oracle: Arc<dyn PriceOracle>,
        trades: TradeRepository,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            oracle,
            trades,
            config,
        }
    }

    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        strategy: &StrategyConfig,
    ) -> Result<ExecutedTrade, ExecutionError> {
        let quote = self.oracle.get_quote(&request.symbol).await?;

        if request.enforce_price_gates {
            if quote.tick_age_ms > self.config.price_stale_max_ms {
                return Err(ExecutionError::StalePrice {
                    tick_age_ms: quote.tick_age_ms,
                    max_ms: self.config.price_stale_max_ms,
                });
            }
            let spread_bps = quote.spread_bps();
            if spread_bps > self.config.spread_threshold_bps {
                return Err(ExecutionError::SpreadTooWide {
                    spread_bps,
                    max_bps: self.config.spread_threshold_bps,
                });
            }
        }

        let qty = match request.side {
            TradeSide::Buy => self.size_buy(&request.user_id, quote.price).await?,
            TradeSide::Sell => {
                let qty = request.qty_suggested.ok_or_else(|| {
                    ExecutionError::InvalidParameters(
                        "SELL execution requires a quantity".to_string(),
                    )
                })?;
                if request.apply_profit_gate {
                    self.check_profit_gate(request, strategy, qty, quote.price)
                        .await?;
                }
                qty
            }
        };

        let qty = Quantity::new(qty)
            .map_err(|e| ExecutionError::InvalidParameters(e.to_string()))?;
        let total_value = qty.notional_at(quote.price);

        let record = self
            .trades
            .insert(CreateTrade {
                user_id: request.user_id.clone(),
                strategy_id: strategy.ledger_strategy_id().map(str::to_string),
                symbol: request.symbol.clone(),
                side: request.side.as_str().to_string(),
                amount: qty.value(),
                price: quote.price,
                total_value,
                original_purchase_amount: match request.side {
                    TradeSide::Sell => Some(qty.value()),
                    TradeSide::Buy => None,
                },
                decision_path: request.path.as_str().to_string(),
                request_id: request.request_id.clone(),
            })
            .await?;

        info!(
            request_id = %request.request_id,
            symbol = %request.symbol,
            side = %record.side,
            qty = record.amount,
            price = record.price,
            path = %record.decision_path,
            "trade executed"
        );

        Ok(ExecutedTrade {
            qty: record.amount,
            price: record.price,
            total_value: record.total_value,
        })
    }

    /// Size a BUY against the running balance. Shrinks the order to the
    /// remaining balance when it still clears the minimum viable size.
    async fn size_buy(&self, user_id: &str, price: f64) -> Result<f64, ExecutionError> {
        let mut allocation = self.config.trade_allocation_eur;

        if !self.config.paper_trading {
            let available =
                self.config.initial_balance_eur + self.trades.signed_balance(user_id).await?;

            if available < allocation {
                if available >= self.config.min_viable_order_eur {
                    debug!(
                        "Shrinking BUY from {:.2} to remaining balance {:.2}",
                        allocation, available
                    );
                    allocation = available;
                } else {
                    return Err(ExecutionError::InsufficientBalance {
                        required: allocation,
                        available,
                    });
                }
            }
        }

        Ok(allocation / price)
    }

    async fn check_profit_gate(
        &self,
        request: &ExecutionRequest,
        strategy: &StrategyConfig,
        qty: f64,
        price: f64,
    ) -> Result<(), ExecutionError> {
        let history = self
            .trades
            .position_history(&request.user_id, &strategy.strategy_id, &request.symbol)
            .await?;
        let position = FifoPosition::reconstruct(&history);
        let gate = evaluate_sell_gate(&position, qty, price, request.confidence, &strategy.profit);

        if !gate.allowed {
            return Err(ExecutionError::InsufficientProfit {
                failed: gate.failed,
                pnl_eur: gate.pnl_eur,
                pnl_pct: gate.pnl_pct,
                edge_bps: gate.edge_bps,
            });
        }
        Ok(())
    }
}

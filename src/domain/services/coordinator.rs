//! Decision coordinator
//!
//! Serializes competing trade intents into a single authoritative
//! BUY/SELL/HOLD/DEFER decision per (user, strategy, symbol), executes the
//! winner exactly once, and records an audit trail. Two execution modes:
//! direct (arbitration disabled, gates only) and arbitrated (queue,
//! conflict detection, take-profit override, advisory lock).
//!
//! In-process state (cache, queue, metrics) is shared across request
//! tasks and guarded per structure; no I/O happens while those mutexes
//! are held. The advisory lock is a separate, cross-process concern.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::config::CoordinatorConfig;
use crate::domain::entities::decision::{DecisionAction, DecisionReason, TradeDecision};
use crate::domain::entities::intent::{IntentSource, TradeIntent, TradeSide};
use crate::domain::entities::strategy::StrategyConfig;
use crate::domain::errors::{CoordinatorError, ExecutionError};
use crate::domain::repositories::price_oracle::PriceOracle;
use crate::domain::services::conflict_detector::{self, CONFLICT_WINDOW_MINUTES};
use crate::domain::services::decision_cache::DecisionCache;
use crate::domain::services::executor::{
    AtomicExecutor, DecisionPath, ExecutedTrade, ExecutionRequest,
};
use crate::domain::services::metrics::CoordinatorMetrics;
use crate::domain::services::profit_evaluator::{take_profit_trigger, FifoPosition};
use crate::domain::services::symbol_queue::{retry_jitter_ms, Admission, SymbolQueue};
use crate::persistence::advisory_lock::{lock_key, AdvisoryLockManager};
use crate::persistence::models::CreateDecisionLog;
use crate::persistence::repository::{
    DecisionLogRepository, StrategyRepository, TradeRepository,
};
use crate::persistence::DbPool;

/// Retry jitter for queue-overload DEFERs and price-gate DEFERs.
const OVERLOAD_JITTER_MS: (u64, u64) = (300, 800);
/// Retry jitter for lock-contention DEFERs.
const LOCK_BUSY_JITTER_MS: (u64, u64) = (200, 500);

pub struct DecisionCoordinator {
    oracle: Arc<dyn PriceOracle>,
    strategies: StrategyRepository,
    trades: TradeRepository,
    decision_log: DecisionLogRepository,
    locks: AdvisoryLockManager,
    executor: AtomicExecutor,
    cache: DecisionCache,
    queue: SymbolQueue,
    metrics: Arc<Mutex<CoordinatorMetrics>>,
}

impl DecisionCoordinator {
    pub fn new(pool: DbPool, oracle: Arc<dyn PriceOracle>, config: CoordinatorConfig) -> Self {
        let trades = TradeRepository::new(pool.clone());
        Self {
            executor: AtomicExecutor::new(oracle.clone(), trades.clone(), config),
            oracle,
            strategies: StrategyRepository::new(pool.clone()),
            trades,
            decision_log: DecisionLogRepository::new(pool.clone()),
            locks: AdvisoryLockManager::new(pool),
            cache: DecisionCache::new(),
            queue: SymbolQueue::new(),
            metrics: Arc::new(Mutex::new(CoordinatorMetrics::new())),
        }
    }

    pub async fn metrics_snapshot(&self) -> CoordinatorMetrics {
        self.metrics.lock().await.clone()
    }

    /// Arbitrate one intent to a terminal decision. Structural and lookup
    /// failures surface as errors (4xx); everything else is a decision.
    pub async fn decide(&self, intent: TradeIntent) -> Result<TradeDecision, CoordinatorError> {
        intent.validate().map_err(CoordinatorError::InvalidIntent)?;

        let now = Utc::now();
        let key = self.cache.derive_key(&intent, now);
        let request_id = format!("req_{}", key.chars().take(16).collect::<String>());

        if let Some(cached) = self.cache.get(&key) {
            let mut metrics = self.metrics.lock().await;
            metrics.cache_hits += 1;
            metrics.touch();
            return Ok(cached);
        }

        let strategy = self
            .strategies
            .get(&intent.strategy_id, &intent.user_id)
            .await?
            .ok_or_else(|| CoordinatorError::StrategyNotFound {
                strategy_id: intent.strategy_id.clone(),
                user_id: intent.user_id.clone(),
            })?;

        let decision = if strategy.enable_unified_decisions {
            self.decide_arbitrated(&intent, &strategy, &key, &request_id)
                .await?
        } else {
            self.decide_direct(&intent, &strategy, &request_id).await?
        };

        self.cache.put(key, decision.clone());
        self.record_metrics(&decision, strategy.enable_unified_decisions)
            .await;
        self.log_decision(&intent, &decision);

        Ok(decision)
    }

    /// Direct mode: no queue, no conflict detection, no lock. Still refuses
    /// unsafe trades: premature SELLs, stale/wide SELL quotes, underfunded
    /// BUYs.
    async fn decide_direct(
        &self,
        intent: &TradeIntent,
        strategy: &StrategyConfig,
        request_id: &str,
    ) -> Result<TradeDecision, CoordinatorError> {
        if intent.side == TradeSide::Sell {
            // Hold period re-derived here since the conflict detector is
            // bypassed in this mode.
            let window_start =
                Utc::now() - Duration::milliseconds(strategy.unified.min_hold_period_ms);
            let recent = self
                .trades
                .recent_for_key(
                    &intent.user_id,
                    &intent.strategy_id,
                    &intent.symbol,
                    window_start,
                )
                .await?;
            if recent.iter().any(|t| t.is_buy()) {
                return Ok(TradeDecision::hold(
                    request_id,
                    DecisionReason::HoldMinPeriodNotMet,
                ));
            }
        }

        let request = ExecutionRequest {
            user_id: intent.user_id.clone(),
            symbol: intent.symbol.clone(),
            side: intent.side,
            qty_suggested: intent.qty_suggested,
            confidence: intent.confidence,
            request_id: request_id.to_string(),
            path: DecisionPath::Direct,
            enforce_price_gates: intent.side == TradeSide::Sell,
            apply_profit_gate: false,
        };

        match self.executor.execute(&request, strategy).await {
            Ok(trade) => Ok(self.executed_decision(
                request_id,
                intent.side,
                DecisionReason::UnifiedDecisionsDisabledDirectPath,
                &trade,
            )),
            Err(e) => Ok(self.map_gate_failure(request_id, e, DecisionReason::DirectExecutionFailed)),
        }
    }

    /// Arbitrated mode: admission control, conflict detection, take-profit
    /// override, then the locked atomic section.
    async fn decide_arbitrated(
        &self,
        intent: &TradeIntent,
        strategy: &StrategyConfig,
        idempotency_key: &str,
        request_id: &str,
    ) -> Result<TradeDecision, CoordinatorError> {
        let symbol_key = intent.symbol_key();

        if self.queue.admit(&symbol_key, idempotency_key) == Admission::Overloaded {
            return Ok(TradeDecision::defer(
                request_id,
                DecisionReason::QueueOverloadDefer,
                retry_jitter_ms(OVERLOAD_JITTER_MS.0, OVERLOAD_JITTER_MS.1),
            ));
        }

        // The queue slot must be released on every exit path.
        let result = self.arbitrated_admitted(intent, strategy, request_id).await;
        self.queue.release(&symbol_key, idempotency_key);
        result
    }

    async fn arbitrated_admitted(
        &self,
        intent: &TradeIntent,
        strategy: &StrategyConfig,
        request_id: &str,
    ) -> Result<TradeDecision, CoordinatorError> {
        let now = Utc::now();
        let window_start = now - Duration::minutes(CONFLICT_WINDOW_MINUTES);
        let recent = self
            .trades
            .recent_for_key(
                &intent.user_id,
                &intent.strategy_id,
                &intent.symbol,
                window_start,
            )
            .await?;

        let verdict = conflict_detector::evaluate(intent, &recent, &strategy.unified, now);
        if verdict.has_conflict {
            return Ok(TradeDecision::hold(request_id, verdict.reason));
        }

        let mut success_reason = verdict.reason;
        let mut request = ExecutionRequest {
            user_id: intent.user_id.clone(),
            symbol: intent.symbol.clone(),
            side: intent.side,
            qty_suggested: intent.qty_suggested,
            confidence: intent.confidence,
            request_id: request_id.to_string(),
            path: DecisionPath::Arbitrated,
            enforce_price_gates: true,
            apply_profit_gate: intent.side == TradeSide::Sell
                && intent.source != IntentSource::Manual,
        };

        // Take-profit auto-trigger. Manual intents are never preempted by
        // the engine's synthetic exit.
        if intent.source != IntentSource::Manual {
            if let Some(tp_qty) = self
                .take_profit_override(intent, strategy, &recent, now)
                .await?
            {
                request.side = TradeSide::Sell;
                request.qty_suggested = Some(tp_qty);
                request.confidence = 1.0;
                request.path = DecisionPath::CoordinatorTp;
                request.apply_profit_gate = false;
                success_reason = DecisionReason::TpHit;
                let mut metrics = self.metrics.lock().await;
                metrics.tp_triggers += 1;
            }
        }

        let key = lock_key(&intent.user_id, &intent.strategy_id, &intent.symbol);
        let guard = match self.locks.try_acquire(key, request_id).await? {
            Some(guard) => guard,
            None => {
                return Ok(TradeDecision::defer(
                    request_id,
                    DecisionReason::AtomicSectionBusyDefer,
                    retry_jitter_ms(LOCK_BUSY_JITTER_MS.0, LOCK_BUSY_JITTER_MS.1),
                ));
            }
        };

        let exec_result = self.executor.execute(&request, strategy).await;

        // Release failures are logged but never change the outcome; the
        // trade has already happened (or not) by this point.
        if let Err(e) = guard.release().await {
            error!(request_id, "advisory lock release failed: {}", e);
        }

        match exec_result {
            Ok(trade) => {
                Ok(self.executed_decision(request_id, request.side, success_reason, &trade))
            }
            Err(e) => Ok(self.map_gate_failure(request_id, e, DecisionReason::InternalError)),
        }
    }

    /// Evaluate the take-profit trigger against the remaining FIFO
    /// position. The synthetic SELL is still subject to the hold-period
    /// and cooldown gates; if those block it, the original intent stands.
    async fn take_profit_override(
        &self,
        intent: &TradeIntent,
        strategy: &StrategyConfig,
        recent: &[crate::persistence::models::TradeRecord],
        now: chrono::DateTime<Utc>,
    ) -> Result<Option<f64>, CoordinatorError> {
        let history = self
            .trades
            .position_history(&intent.user_id, &intent.strategy_id, &intent.symbol)
            .await?;
        let position = FifoPosition::reconstruct(&history);
        if position.remaining_qty() <= f64::EPSILON {
            return Ok(None);
        }

        let quote = match self.oracle.get_quote(&intent.symbol).await {
            Ok(quote) => quote,
            Err(e) => {
                // The executor re-fetches under the lock and will surface
                // the oracle failure there if it persists.
                warn!(symbol = %intent.symbol, "oracle unavailable for TP check: {}", e);
                return Ok(None);
            }
        };

        let Some(tp_qty) = take_profit_trigger(&position, quote.price, &strategy.profit) else {
            return Ok(None);
        };

        let synthetic = TradeIntent {
            side: TradeSide::Sell,
            source: IntentSource::CoordinatorTp,
            confidence: 1.0,
            qty_suggested: Some(tp_qty),
            ..intent.clone()
        };
        let verdict = conflict_detector::evaluate(&synthetic, recent, &strategy.unified, now);
        if verdict.has_conflict {
            return Ok(None);
        }

        Ok(Some(tp_qty))
    }

    fn executed_decision(
        &self,
        request_id: &str,
        side: TradeSide,
        reason: DecisionReason,
        trade: &ExecutedTrade,
    ) -> TradeDecision {
        let action = match side {
            TradeSide::Buy => DecisionAction::Buy,
            TradeSide::Sell => DecisionAction::Sell,
        };
        TradeDecision::executed(request_id, action, reason, trade.qty)
    }

    /// Map execution failures onto terminal decisions. Transient gate
    /// failures become DEFERs with a retry hint; everything else downgrades
    /// to HOLD with the path-specific failure reason.
    fn map_gate_failure(
        &self,
        request_id: &str,
        error: ExecutionError,
        failure_reason: DecisionReason,
    ) -> TradeDecision {
        match error {
            ExecutionError::StalePrice { tick_age_ms, max_ms } => TradeDecision::defer(
                request_id,
                DecisionReason::InsufficientPriceFreshness,
                retry_jitter_ms(OVERLOAD_JITTER_MS.0, OVERLOAD_JITTER_MS.1),
            )
            .with_metadata(json!({ "tick_age_ms": tick_age_ms, "max_ms": max_ms })),
            ExecutionError::SpreadTooWide { spread_bps, max_bps } => TradeDecision::defer(
                request_id,
                DecisionReason::SpreadTooWide,
                retry_jitter_ms(OVERLOAD_JITTER_MS.0, OVERLOAD_JITTER_MS.1),
            )
            .with_metadata(json!({ "spread_bps": spread_bps, "max_bps": max_bps })),
            ExecutionError::Oracle(e) => {
                warn!(request_id, "price oracle failed during execution: {}", e);
                TradeDecision::defer(
                    request_id,
                    DecisionReason::InsufficientPriceFreshness,
                    retry_jitter_ms(OVERLOAD_JITTER_MS.0, OVERLOAD_JITTER_MS.1),
                )
            }
            ExecutionError::InsufficientProfit {
                failed,
                pnl_eur,
                pnl_pct,
                edge_bps,
            } => TradeDecision::defer(
                request_id,
                DecisionReason::BlockedByInsufficientProfit,
                retry_jitter_ms(OVERLOAD_JITTER_MS.0, OVERLOAD_JITTER_MS.1),
            )
            .with_metadata(json!({
                "pnl_eur": pnl_eur,
                "pnl_pct": pnl_pct,
                "edge_bps": edge_bps,
                "failed_conditions": failed,
            })),
            ExecutionError::InsufficientBalance { required, available } => {
                warn!(
                    request_id,
                    "buy rejected: required {:.2}, available {:.2}", required, available
                );
                TradeDecision::hold(request_id, failure_reason).with_metadata(json!({
                    "error": "insufficient_balance",
                    "required": required,
                    "available": available,
                }))
            }
            ExecutionError::Database(e) => {
                error!(request_id, "ledger write failed: {}", e);
                TradeDecision::hold(request_id, failure_reason)
            }
            ExecutionError::InvalidParameters(detail) => {
                error!(request_id, "invalid execution parameters: {}", detail);
                TradeDecision::hold(request_id, failure_reason)
            }
        }
    }

    async fn record_metrics(&self, decision: &TradeDecision, arbitrated: bool) {
        let mut metrics = self.metrics.lock().await;
        metrics.decisions_total += 1;
        if !arbitrated {
            metrics.direct_path_decisions += 1;
        }
        match decision.action {
            DecisionAction::Buy | DecisionAction::Sell => metrics.executed_trades += 1,
            DecisionAction::Hold => {
                metrics.holds += 1;
                if matches!(
                    decision.reason,
                    DecisionReason::HoldMinPeriodNotMet
                        | DecisionReason::BlockedByCooldown
                        | DecisionReason::BlockedByPoolExitPrecedence
                ) {
                    metrics.conflicts_detected += 1;
                }
            }
            DecisionAction::Defer => match decision.reason {
                DecisionReason::QueueOverloadDefer => metrics.defers_queue_overload += 1,
                DecisionReason::AtomicSectionBusyDefer => metrics.defers_lock_busy += 1,
                DecisionReason::InsufficientPriceFreshness | DecisionReason::SpreadTooWide => {
                    metrics.defers_price_gate += 1
                }
                DecisionReason::BlockedByInsufficientProfit => metrics.defers_profit_gate += 1,
                _ => {}
            },
        }
        metrics.touch();
    }

    /// Fire-and-forget audit write. Failures are logged and swallowed;
    /// the audit trail never fails the primary decision.
    fn log_decision(&self, intent: &TradeIntent, decision: &TradeDecision) {
        let repo = self.decision_log.clone();
        let entry = CreateDecisionLog {
            request_id: decision.request_id.clone(),
            user_id: intent.user_id.clone(),
            strategy_id: intent.strategy_id.clone(),
            symbol: intent.symbol.clone(),
            side: intent.side.as_str().to_string(),
            source: intent.source.as_str().to_string(),
            action: decision.action.as_str().to_string(),
            reason: decision.reason.as_str().to_string(),
            confidence: intent.confidence,
            metadata: decision
                .metadata
                .as_ref()
                .and_then(|m| serde_json::to_string(m).ok()),
        };
        tokio::spawn(async move {
            if let Err(e) = repo.insert(entry).await {
                warn!("decision log write failed: {}", e);
            }
        });
    }
}

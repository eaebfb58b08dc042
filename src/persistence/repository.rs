//! Database Repositories
//!
//! Data access for strategy configuration, the trade ledger, and the
//! decision audit log.

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use super::models::*;
use super::{DatabaseError, DbPool};
use crate::domain::entities::strategy::StrategyConfig;

/// Strategy configuration reads
#[derive(Clone)]
pub struct StrategyRepository {
    pool: DbPool,
}

impl StrategyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Fetch a strategy scoped to its owner; defaults applied at load.
    pub async fn get(
        &self,
        strategy_id: &str,
        user_id: &str,
    ) -> Result<Option<StrategyConfig>, DatabaseError> {
        let row = sqlx::query_as::<_, StrategyRow>(
            "SELECT id, user_id, enable_unified_decisions, min_hold_period_ms,
                    cooldown_between_opposite_actions_ms, confidence_override_threshold,
                    take_profit_percentage, stop_loss_percentage, min_edge_bps_for_exit,
                    min_profit_eur_for_exit, confidence_threshold_for_exit, is_system_operator
             FROM strategies WHERE id = ?1 AND user_id = ?2",
        )
        .bind(strategy_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load strategy {}: {}", strategy_id, e);
            DatabaseError::QueryError(format!("Failed to load strategy: {}", e))
        })?;

        Ok(row.map(StrategyRow::materialize))
    }
}

/// Trade ledger reads and writes
#[derive(Clone)]
pub struct TradeRepository {
    pool: DbPool,
}

impl TradeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert exactly one trade row for an executed decision.
    pub async fn insert(&self, trade: CreateTrade) -> Result<TradeRecord, DatabaseError> {
        let id = format!(
            "trade_{}_{}",
            trade.request_id,
            Utc::now().timestamp_millis()
        );
        let now = Utc::now();

        let record = sqlx::query_as::<_, TradeRecord>(
            r#"
            INSERT INTO trades (
                id, user_id, strategy_id, symbol, side, amount, price,
                total_value, original_purchase_amount, decision_path,
                request_id, executed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&trade.user_id)
        .bind(&trade.strategy_id)
        .bind(&trade.symbol)
        .bind(&trade.side)
        .bind(trade.amount)
        .bind(trade.price)
        .bind(trade.total_value)
        .bind(trade.original_purchase_amount)
        .bind(&trade.decision_path)
        .bind(&trade.request_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to insert trade for {}: {}", trade.symbol, e);
            DatabaseError::QueryError(format!("Failed to insert trade: {}", e))
        })?;

        debug!(
            "Recorded {} {} {} via {}",
            record.side, record.amount, record.symbol, record.decision_path
        );
        Ok(record)
    }

    /// Trades for one (user, strategy, symbol) executed since `window_start`,
    /// newest first. Feeds the conflict detector.
    pub async fn recent_for_key(
        &self,
        user_id: &str,
        strategy_id: &str,
        symbol: &str,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<TradeRecord>, DatabaseError> {
        sqlx::query_as::<_, TradeRecord>(
            "SELECT * FROM trades
             WHERE user_id = ?1 AND strategy_id = ?2 AND symbol = ?3 AND executed_at >= ?4
             ORDER BY executed_at DESC",
        )
        .bind(user_id)
        .bind(strategy_id)
        .bind(symbol)
        .bind(window_start)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load recent trades for {}: {}", symbol, e);
            DatabaseError::QueryError(format!("Failed to load recent trades: {}", e))
        })
    }

    /// Full trade history for one (user, strategy, symbol), oldest first.
    /// Feeds FIFO position reconstruction.
    pub async fn position_history(
        &self,
        user_id: &str,
        strategy_id: &str,
        symbol: &str,
    ) -> Result<Vec<TradeRecord>, DatabaseError> {
        sqlx::query_as::<_, TradeRecord>(
            "SELECT * FROM trades
             WHERE user_id = ?1 AND strategy_id = ?2 AND symbol = ?3
             ORDER BY executed_at ASC",
        )
        .bind(user_id)
        .bind(strategy_id)
        .bind(symbol)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load position history for {}: {}", symbol, e);
            DatabaseError::QueryError(format!("Failed to load position history: {}", e))
        })
    }

    /// Signed sum of all trade values for a user (BUY negative, SELL
    /// positive). Added to the configured initial balance this is the
    /// running available balance.
    pub async fn signed_balance(&self, user_id: &str) -> Result<f64, DatabaseError> {
        let row: (Option<f64>,) = sqlx::query_as(
            "SELECT SUM(CASE WHEN side = 'buy' THEN -total_value ELSE total_value END)
             FROM trades WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to compute balance for {}: {}", user_id, e);
            DatabaseError::QueryError(format!("Failed to compute balance: {}", e))
        })?;

        Ok(row.0.unwrap_or(0.0))
    }
}

/// Best-effort audit writer. Insert failures are logged and swallowed by
/// the caller; they must never fail the primary decision.
#[derive(Clone)]
pub struct DecisionLogRepository {
    pool: DbPool,
}

impl DecisionLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entry: CreateDecisionLog) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO decision_log (
                request_id, user_id, strategy_id, symbol, side, source,
                action, reason, confidence, metadata, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&entry.request_id)
        .bind(&entry.user_id)
        .bind(&entry.strategy_id)
        .bind(&entry.symbol)
        .bind(&entry.side)
        .bind(&entry.source)
        .bind(&entry.action)
        .bind(&entry.reason)
        .bind(entry.confidence)
        .bind(&entry.metadata)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("Failed to insert decision log: {}", e)))?;

        Ok(())
    }
}

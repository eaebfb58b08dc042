//! End-to-end decision flow tests
//!
//! Drives the coordinator through both execution modes against a file-backed
//! SQLite database and a mock price oracle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use arbiter::config::CoordinatorConfig;
use arbiter::domain::entities::decision::{DecisionAction, DecisionReason};
use arbiter::domain::entities::intent::{IntentSource, TradeIntent, TradeSide};
use arbiter::domain::errors::CoordinatorError;
use arbiter::domain::repositories::price_oracle::{OracleResult, PriceOracle};
use arbiter::domain::services::coordinator::DecisionCoordinator;
use arbiter::domain::value_objects::quote::MarketQuote;
use arbiter::persistence::{init_database, DbPool};

struct MockOracle {
    quote: MarketQuote,
    delay: Option<Duration>,
}

#[async_trait]
impl PriceOracle for MockOracle {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_quote(&self, _symbol: &str) -> OracleResult<MarketQuote> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.quote)
    }
}

fn fresh_quote(price: f64) -> MarketQuote {
    MarketQuote::new(price, price * 0.9999, price * 1.0001, 100).unwrap()
}

async fn test_pool(name: &str) -> DbPool {
    let path = std::env::temp_dir().join(format!(
        "arbiter_e2e_{}_{}.db",
        name,
        rand::random::<u64>()
    ));
    init_database(&format!("sqlite://{}", path.display()))
        .await
        .unwrap()
}

async fn seed_strategy(pool: &DbPool, unified: bool, cooldown_ms: i64, hold_ms: i64) {
    sqlx::query(
        "INSERT INTO strategies (
            id, user_id, enable_unified_decisions, min_hold_period_ms,
            cooldown_between_opposite_actions_ms, confidence_override_threshold
        ) VALUES ('s1', 'u1', ?1, ?2, ?3, 0.70)",
    )
    .bind(unified)
    .bind(hold_ms)
    .bind(cooldown_ms)
    .execute(pool)
    .await
    .unwrap();
}

async fn seed_trade(pool: &DbPool, side: &str, amount: f64, price: f64, seconds_ago: i64) {
    let executed_at = Utc::now() - chrono::Duration::seconds(seconds_ago);
    sqlx::query(
        "INSERT INTO trades (
            id, user_id, strategy_id, symbol, side, amount, price, total_value,
            original_purchase_amount, decision_path, request_id, executed_at
        ) VALUES (?1, 'u1', 's1', 'BTC', ?2, ?3, ?4, ?5, ?6, 'arbitrated', 'seed', ?7)",
    )
    .bind(format!("seed_{}_{}", side, rand::random::<u32>()))
    .bind(side)
    .bind(amount)
    .bind(price)
    .bind(amount * price)
    .bind(if side == "sell" { Some(amount) } else { None })
    .bind(executed_at)
    .execute(pool)
    .await
    .unwrap();
}

async fn trade_count(pool: &DbPool) -> i64 {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trades WHERE request_id != 'seed'")
        .fetch_one(pool)
        .await
        .unwrap();
    row.0
}

fn intent(side: TradeSide, source: IntentSource, confidence: f64) -> TradeIntent {
    TradeIntent {
        user_id: "u1".to_string(),
        strategy_id: "s1".to_string(),
        symbol: "BTC".to_string(),
        side,
        source,
        confidence,
        reason: None,
        qty_suggested: match side {
            TradeSide::Sell => Some(0.5),
            TradeSide::Buy => None,
        },
        metadata: None,
        client_timestamp: None,
        idempotency_key: Some(format!("key_{}", rand::random::<u64>())),
    }
}

fn coordinator(pool: DbPool, quote: MarketQuote) -> DecisionCoordinator {
    DecisionCoordinator::new(
        pool,
        Arc::new(MockOracle { quote, delay: None }),
        CoordinatorConfig::default(),
    )
}

#[tokio::test]
async fn direct_mode_buy_executes_with_allocation() {
    let pool = test_pool("direct_buy").await;
    seed_strategy(&pool, false, 30_000, 300_000).await;
    let coordinator = coordinator(pool.clone(), fresh_quote(50_000.0));

    let decision = coordinator
        .decide(intent(TradeSide::Buy, IntentSource::Automated, 0.5))
        .await
        .unwrap();

    assert_eq!(decision.action, DecisionAction::Buy);
    assert_eq!(
        decision.reason,
        DecisionReason::UnifiedDecisionsDisabledDirectPath
    );
    // 50 EUR allocation at 50_000 = 0.001
    assert!((decision.qty.unwrap() - 0.001).abs() < 1e-9);

    let row: (f64, f64, f64) =
        sqlx::query_as("SELECT amount, price, total_value FROM trades WHERE request_id != 'seed'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!((row.0 - 0.001).abs() < 1e-9);
    assert_eq!(row.1, 50_000.0);
    assert!((row.2 - 50.0).abs() < 1e-6);
}

#[tokio::test]
async fn direct_mode_sell_respects_hold_period() {
    let pool = test_pool("direct_hold").await;
    seed_strategy(&pool, false, 30_000, 300_000).await;
    seed_trade(&pool, "buy", 1.0, 100.0, 10).await;
    let coordinator = coordinator(pool.clone(), fresh_quote(110.0));

    let decision = coordinator
        .decide(intent(TradeSide::Sell, IntentSource::Automated, 0.9))
        .await
        .unwrap();

    assert_eq!(decision.action, DecisionAction::Hold);
    assert_eq!(decision.reason, DecisionReason::HoldMinPeriodNotMet);
    assert_eq!(trade_count(&pool).await, 0);
}

#[tokio::test]
async fn cooldown_blocks_automated_buy() {
    let pool = test_pool("cooldown").await;
    seed_strategy(&pool, true, 30_000, 300_000).await;
    seed_trade(&pool, "sell", 0.5, 100.0, 10).await;
    let coordinator = coordinator(pool.clone(), fresh_quote(100.0));

    let decision = coordinator
        .decide(intent(TradeSide::Buy, IntentSource::Automated, 0.5))
        .await
        .unwrap();

    assert_eq!(decision.action, DecisionAction::Hold);
    assert_eq!(decision.reason, DecisionReason::BlockedByCooldown);
    assert_eq!(trade_count(&pool).await, 0);
}

#[tokio::test]
async fn confidence_override_bypasses_cooldown() {
    let pool = test_pool("override").await;
    seed_strategy(&pool, true, 30_000, 300_000).await;
    seed_trade(&pool, "sell", 0.5, 100.0, 10).await;
    let coordinator = coordinator(pool.clone(), fresh_quote(100.0));

    let decision = coordinator
        .decide(intent(TradeSide::Buy, IntentSource::Intelligent, 0.85))
        .await
        .unwrap();

    assert_eq!(decision.action, DecisionAction::Buy);
    assert_eq!(decision.reason, DecisionReason::ConfidenceOverrideApplied);
    assert_eq!(trade_count(&pool).await, 1);
}

#[tokio::test]
async fn stale_price_defers_sell_with_no_ledger_write() {
    let pool = test_pool("stale").await;
    seed_strategy(&pool, true, 30_000, 300_000).await;
    // Position old enough to clear hold period and conflict window
    seed_trade(&pool, "buy", 1.0, 100.0, 1_200).await;

    let quote = MarketQuote::new(110.0, 109.99, 110.01, 20_000).unwrap();
    let coordinator = DecisionCoordinator::new(
        pool.clone(),
        Arc::new(MockOracle { quote, delay: None }),
        CoordinatorConfig::default(),
    );

    let decision = coordinator
        .decide(intent(TradeSide::Sell, IntentSource::Manual, 0.9))
        .await
        .unwrap();

    assert_eq!(decision.action, DecisionAction::Defer);
    assert_eq!(decision.reason, DecisionReason::InsufficientPriceFreshness);
    let retry = decision.retry_in_ms.unwrap();
    assert!((300..=800).contains(&retry));
    assert_eq!(trade_count(&pool).await, 0);
}

#[tokio::test]
async fn marginal_sell_blocked_by_profit_gate() {
    let pool = test_pool("profit_gate").await;
    seed_strategy(&pool, true, 30_000, 300_000).await;
    seed_trade(&pool, "buy", 1.0, 100.0, 1_200).await;
    // +0.05%: below take-profit, above stop-loss, fails every edge minimum
    let coordinator = coordinator(pool.clone(), fresh_quote(100.05));

    let decision = coordinator
        .decide(intent(TradeSide::Sell, IntentSource::Automated, 0.3))
        .await
        .unwrap();

    assert_eq!(decision.action, DecisionAction::Defer);
    assert_eq!(decision.reason, DecisionReason::BlockedByInsufficientProfit);
    let metadata = decision.metadata.unwrap();
    assert!(!metadata["failed_conditions"].as_array().unwrap().is_empty());
    assert_eq!(trade_count(&pool).await, 0);
}

#[tokio::test]
async fn take_profit_trigger_preempts_weak_buy() {
    let pool = test_pool("tp").await;
    seed_strategy(&pool, true, 30_000, 300_000).await;
    // Open position bought at 100, 20 minutes ago (outside conflict window)
    seed_trade(&pool, "buy", 2.0, 100.0, 1_200).await;
    // +10% with a 5% default take-profit threshold
    let coordinator = coordinator(pool.clone(), fresh_quote(110.0));

    let decision = coordinator
        .decide(intent(TradeSide::Buy, IntentSource::Automated, 0.4))
        .await
        .unwrap();

    assert_eq!(decision.action, DecisionAction::Sell);
    assert_eq!(decision.reason, DecisionReason::TpHit);
    // Entire remaining position exits
    assert!((decision.qty.unwrap() - 2.0).abs() < 1e-9);

    let row: (String, f64) =
        sqlx::query_as("SELECT decision_path, amount FROM trades WHERE request_id != 'seed'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(row.0, "coordinator_tp");
    assert!((row.1 - 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn manual_intent_is_never_preempted_by_take_profit() {
    let pool = test_pool("tp_manual").await;
    seed_strategy(&pool, true, 30_000, 300_000).await;
    seed_trade(&pool, "buy", 2.0, 100.0, 1_200).await;
    let coordinator = coordinator(pool.clone(), fresh_quote(110.0));

    let decision = coordinator
        .decide(intent(TradeSide::Buy, IntentSource::Manual, 0.9))
        .await
        .unwrap();

    // The manual BUY executes as submitted
    assert_eq!(decision.action, DecisionAction::Buy);
    assert_eq!(decision.reason, DecisionReason::ManualOverridePrecedence);
}

#[tokio::test]
async fn idempotent_replay_returns_identical_decision() {
    let pool = test_pool("idempotent").await;
    seed_strategy(&pool, false, 30_000, 300_000).await;
    let coordinator = coordinator(pool.clone(), fresh_quote(50_000.0));

    let mut i = intent(TradeSide::Buy, IntentSource::Automated, 0.5);
    i.idempotency_key = Some("retry_key".to_string());

    let first = coordinator.decide(i.clone()).await.unwrap();
    let second = coordinator.decide(i).await.unwrap();

    assert_eq!(first, second);
    // Replay did not execute a second trade
    assert_eq!(trade_count(&pool).await, 1);
}

#[tokio::test]
async fn unknown_strategy_is_a_lookup_failure() {
    let pool = test_pool("no_strategy").await;
    let coordinator = coordinator(pool, fresh_quote(100.0));

    let err = coordinator
        .decide(intent(TradeSide::Buy, IntentSource::Automated, 0.5))
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::StrategyNotFound { .. }));
}

#[tokio::test]
async fn invalid_intent_is_rejected_before_any_lookup() {
    let pool = test_pool("invalid").await;
    let coordinator = coordinator(pool, fresh_quote(100.0));

    let mut i = intent(TradeSide::Sell, IntentSource::Automated, 0.5);
    i.qty_suggested = None;

    let err = coordinator.decide(i).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidIntent(_)));
}

#[tokio::test]
async fn concurrent_intents_serialize_to_one_execution() {
    let pool = test_pool("concurrent").await;
    seed_strategy(&pool, true, 30_000, 300_000).await;

    // A slow oracle holds the first intent inside the critical section
    // while the others pile up behind the queue and the lock.
    let coordinator = Arc::new(DecisionCoordinator::new(
        pool.clone(),
        Arc::new(MockOracle {
            quote: fresh_quote(50_000.0),
            delay: Some(Duration::from_millis(200)),
        }),
        CoordinatorConfig::default(),
    ));

    let mut handles = Vec::new();
    for _ in 0..3 {
        let coordinator = coordinator.clone();
        let i = intent(TradeSide::Buy, IntentSource::Automated, 0.5);
        handles.push(tokio::spawn(async move { coordinator.decide(i).await }));
    }

    let mut executed = 0;
    let mut deferred = 0;
    for handle in handles {
        let decision = handle.await.unwrap().unwrap();
        match decision.action {
            DecisionAction::Buy => executed += 1,
            DecisionAction::Defer => {
                deferred += 1;
                assert!(matches!(
                    decision.reason,
                    DecisionReason::QueueOverloadDefer | DecisionReason::AtomicSectionBusyDefer
                ));
                let retry = decision.retry_in_ms.unwrap();
                assert!((200..=800).contains(&retry));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    assert_eq!(executed, 1, "exactly one intent wins the critical section");
    assert_eq!(deferred, 2);
    assert_eq!(trade_count(&pool).await, 1);
}

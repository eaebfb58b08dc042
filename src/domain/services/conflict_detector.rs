//! Conflict detector - precedence, cooldown and hold-period rules
//!
//! Pure decision logic over the intent and the last ten minutes of trade
//! history for its (user, strategy, symbol) key. Precedence is
//! manual > pool-exit > automated: an automated strategy never fights an
//! operator's explicit action or a portfolio-level exit, and cooldowns
//! stop buy-sell-buy thrashing from noisy signals.

use chrono::{DateTime, Duration, Utc};

use crate::domain::entities::decision::DecisionReason;
use crate::domain::entities::intent::{IntentSource, TradeIntent, TradeSide};
use crate::domain::entities::strategy::UnifiedConfig;
use crate::persistence::models::TradeRecord;

/// History window the detector inspects.
pub const CONFLICT_WINDOW_MINUTES: i64 = 10;

/// Detector output. When `has_conflict` is false the reason is the one an
/// executed decision should carry (override/precedence reasons included).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictVerdict {
    pub has_conflict: bool,
    pub reason: DecisionReason,
}

impl ConflictVerdict {
    fn conflict(reason: DecisionReason) -> Self {
        Self {
            has_conflict: true,
            reason,
        }
    }

    fn clear(reason: DecisionReason) -> Self {
        Self {
            has_conflict: false,
            reason,
        }
    }
}

/// Evaluate an intent against recent trades (newest first), applying the
/// rules in priority order.
pub fn evaluate(
    intent: &TradeIntent,
    recent_trades: &[TradeRecord],
    config: &UnifiedConfig,
    now: DateTime<Utc>,
) -> ConflictVerdict {
    // 1. Operator override always wins.
    if intent.source == IntentSource::Manual {
        return ConflictVerdict::clear(DecisionReason::ManualOverridePrecedence);
    }

    // 2. Pool exits: blocked only by a BUY inside the cooldown window,
    //    otherwise they bypass the hold-period check entirely.
    if intent.source == IntentSource::Pool && intent.side == TradeSide::Sell {
        if let Some(last_buy) = most_recent(recent_trades, TradeSide::Buy) {
            if within(now, last_buy.executed_at, config.cooldown_between_opposite_actions_ms) {
                return ConflictVerdict::conflict(DecisionReason::BlockedByPoolExitPrecedence);
            }
        }
        return ConflictVerdict::clear(DecisionReason::NoConflictsDetected);
    }

    // 3. Universal SELL hold-period, checked before cooldown.
    if intent.side == TradeSide::Sell {
        if let Some(last_buy) = most_recent(recent_trades, TradeSide::Buy) {
            if within(now, last_buy.executed_at, config.min_hold_period_ms) {
                return ConflictVerdict::conflict(DecisionReason::HoldMinPeriodNotMet);
            }
        }
    }

    // 4. Opposite-action cooldown, with a confidence escape hatch for
    //    high-conviction signal sources.
    if let Some(last_opposite) = most_recent(recent_trades, intent.side.opposite()) {
        if within(
            now,
            last_opposite.executed_at,
            config.cooldown_between_opposite_actions_ms,
        ) {
            if intent.source.can_override_cooldown()
                && intent.confidence >= config.confidence_override_threshold
            {
                return ConflictVerdict::clear(DecisionReason::ConfidenceOverrideApplied);
            }
            return ConflictVerdict::conflict(DecisionReason::BlockedByCooldown);
        }
    }

    ConflictVerdict::clear(DecisionReason::NoConflictsDetected)
}

fn most_recent(trades_newest_first: &[TradeRecord], side: TradeSide) -> Option<&TradeRecord> {
    trades_newest_first
        .iter()
        .find(|t| t.side == side.as_str())
}

fn within(now: DateTime<Utc>, then: DateTime<Utc>, window_ms: i64) -> bool {
    now - then < Duration::milliseconds(window_ms)
}

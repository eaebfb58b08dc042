//! Coordinator configuration
//!
//! All tunables are loaded from the environment once at startup with named
//! defaults; nothing re-derives defaults at call sites.

use std::env;

/// Execution-time tunables shared by the direct and arbitrated paths.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Reject quotes older than this at execution time
    pub price_stale_max_ms: u64,
    /// Reject quotes with a wider bid/ask spread than this
    pub spread_threshold_bps: f64,
    /// Target notional per BUY
    pub trade_allocation_eur: f64,
    /// Smallest BUY the executor will shrink an order down to
    pub min_viable_order_eur: f64,
    /// Starting balance for the running signed-ledger view
    pub initial_balance_eur: f64,
    /// Paper trading: skip the balance check entirely
    pub paper_trading: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            price_stale_max_ms: 15_000,
            spread_threshold_bps: 15.0,
            trade_allocation_eur: 50.0,
            min_viable_order_eur: 10.0,
            initial_balance_eur: 1_000.0,
            paper_trading: false,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            price_stale_max_ms: env_parse("PRICE_STALE_MAX_MS", defaults.price_stale_max_ms),
            spread_threshold_bps: env_parse("SPREAD_THRESHOLD_BPS", defaults.spread_threshold_bps),
            trade_allocation_eur: env_parse("TRADE_ALLOCATION_EUR", defaults.trade_allocation_eur),
            min_viable_order_eur: env_parse(
                "MIN_VIABLE_ORDER_EUR",
                defaults.min_viable_order_eur,
            ),
            initial_balance_eur: env_parse("INITIAL_BALANCE_EUR", defaults.initial_balance_eur),
            paper_trading: env_parse("PAPER_TRADING", defaults.paper_trading),
        }
    }
}

/// Process-level settings (bind address, database, oracle endpoint).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub price_api_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            database_url: "sqlite://data/arbiter.db".to_string(),
            price_api_url: "https://api.kraken.com/0/public/Ticker".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            price_api_url: env::var("PRICE_API_URL").unwrap_or(defaults.price_api_url),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

use thiserror::Error;

/// Value-object validation failures
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Value must be finite")]
    MustBeFinite,
}

/// Price oracle failures. Treated as transient by the coordinator.
#[derive(Debug, Error, Clone)]
pub enum OracleError {
    #[error("Oracle request failed: {0}")]
    RequestFailed(String),

    #[error("Oracle returned malformed quote for {symbol}: {detail}")]
    MalformedQuote { symbol: String, detail: String },

    #[error("No quote available for symbol: {0}")]
    NoQuote(String),
}

/// Failures inside the atomic execution section. The coordinator maps
/// these to terminal decisions; they never escape as HTTP errors.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Price tick age {tick_age_ms}ms exceeds freshness limit {max_ms}ms")]
    StalePrice { tick_age_ms: u64, max_ms: u64 },

    #[error("Spread {spread_bps:.2}bps exceeds threshold {max_bps:.2}bps")]
    SpreadTooWide { spread_bps: f64, max_bps: f64 },

    #[error("Insufficient balance: required {required:.2}, available {available:.2}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("Sell blocked by profit gate: {failed:?}")]
    InsufficientProfit {
        failed: Vec<String>,
        pnl_eur: f64,
        pnl_pct: f64,
        edge_bps: f64,
    },

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Ledger write failed: {0}")]
    Database(#[from] crate::persistence::DatabaseError),

    #[error("Invalid execution parameters: {0}")]
    InvalidParameters(String),
}

/// Top-level coordinator failures that surface over HTTP.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    #[error("Strategy {strategy_id} not found for user {user_id}")]
    StrategyNotFound {
        strategy_id: String,
        user_id: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] crate::persistence::DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for CoordinatorError {
    fn from(e: ValidationError) -> Self {
        CoordinatorError::InvalidIntent(e.to_string())
    }
}

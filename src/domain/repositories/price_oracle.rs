//! Price oracle port
//!
//! The coordinator consumes market data through this trait; the reqwest
//! implementation lives in `infrastructure`. Tests substitute a mock.

use async_trait::async_trait;

use crate::domain::errors::OracleError;
use crate::domain::value_objects::quote::MarketQuote;

pub type OracleResult<T> = Result<T, OracleError>;

#[async_trait]
pub trait PriceOracle: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the current quote for a symbol. The returned `tick_age_ms`
    /// is the adapter's freshness proxy (call latency or feed age).
    async fn get_quote(&self, symbol: &str) -> OracleResult<MarketQuote>;
}

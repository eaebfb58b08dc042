//! Market quote value object

use crate::domain::errors::ValidationError;

/// A point-in-time quote for one symbol. The tick age is derived by the
/// oracle adapter from its own call latency and acts as the freshness proxy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketQuote {
    pub price: f64,
    pub bid: f64,
    pub ask: f64,
    pub tick_age_ms: u64,
}

impl MarketQuote {
    pub fn new(price: f64, bid: f64, ask: f64, tick_age_ms: u64) -> Result<Self, ValidationError> {
        for v in [price, bid, ask] {
            if !v.is_finite() {
                return Err(ValidationError::MustBeFinite);
            }
            if v <= 0.0 {
                return Err(ValidationError::InvalidPrice(format!(
                    "quote fields must be positive, got {}",
                    v
                )));
            }
        }
        if bid > ask {
            return Err(ValidationError::InvalidPrice(format!(
                "crossed quote: bid {} > ask {}",
                bid, ask
            )));
        }
        Ok(Self {
            price,
            bid,
            ask,
            tick_age_ms,
        })
    }

    /// Bid/ask spread expressed in basis points of the mid price.
    pub fn spread_bps(&self) -> f64 {
        (self.ask - self.bid) / self.price * 10_000.0
    }
}

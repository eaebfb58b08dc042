//! HTTP price oracle adapter
//!
//! Fetches quotes from a REST ticker endpoint. The request round-trip time
//! is used as the tick-age freshness proxy, so a slow or congested oracle
//! naturally fails the executor's staleness gate.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::domain::errors::OracleError;
use crate::domain::repositories::price_oracle::{OracleResult, PriceOracle};
use crate::domain::value_objects::quote::MarketQuote;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct TickerResponse {
    price: f64,
    bid: f64,
    ask: f64,
}

pub struct HttpPriceOracle {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPriceOracle {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    fn name(&self) -> &str {
        "http"
    }

    async fn get_quote(&self, symbol: &str) -> OracleResult<MarketQuote> {
        let started = Instant::now();

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| OracleError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::NoQuote(format!(
                "{} returned {}",
                symbol,
                response.status()
            )));
        }

        let ticker: TickerResponse = response
            .json()
            .await
            .map_err(|e| OracleError::MalformedQuote {
                symbol: symbol.to_string(),
                detail: e.to_string(),
            })?;

        let tick_age_ms = started.elapsed().as_millis() as u64;
        debug!(symbol, price = ticker.price, tick_age_ms, "quote fetched");

        MarketQuote::new(ticker.price, ticker.bid, ticker.ask, tick_age_ms).map_err(|e| {
            OracleError::MalformedQuote {
                symbol: symbol.to_string(),
                detail: e.to_string(),
            }
        })
    }
}

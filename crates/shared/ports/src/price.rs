use crate::error::PriceSourceError;
use async_trait::async_trait;
use meridian_core::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-of-book snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last: Price,
    pub bid: Price,
    pub ask: Price,
}

impl Ticker {
    /// Mid price, falling back to last trade when the book is one-sided
    pub fn mid(&self) -> Price {
        if self.bid > Decimal::ZERO && self.ask > Decimal::ZERO {
            (self.bid + self.ask) / Decimal::TWO
        } else {
            self.last
        }
    }
}

/// Port for account balances and market prices
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Balance per asset
    async fn get_all_balances(&self) -> Result<HashMap<String, Decimal>, PriceSourceError>;

    /// Latest ticker for a symbol
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, PriceSourceError>;
}

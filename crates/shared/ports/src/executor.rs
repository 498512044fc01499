use crate::error::ExecutorError;
use async_trait::async_trait;
use meridian_core::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Result of a market execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeFill {
    /// Did the venue fill the trade?
    pub success: bool,
    /// Units filled
    pub filled_size: Quantity,
    /// Average fill price
    pub price: Price,
    /// Fee charged (quote currency)
    pub fee: Decimal,
}

impl TradeFill {
    /// Notional value of the fill
    pub fn notional(&self) -> Decimal {
        self.filled_size * self.price
    }
}

/// Port for sending trades to a venue
///
/// Calls are synchronous request/response: no partial-fill streaming.
/// Implementations must fail fast when the venue is unreachable.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Buy `usd_amount` worth of `symbol`
    async fn execute_buy(
        &self,
        symbol: &str,
        usd_amount: Decimal,
        reason: &str,
    ) -> Result<TradeFill, ExecutorError>;

    /// Sell `usd_amount` worth of `symbol`
    async fn execute_sell(
        &self,
        symbol: &str,
        usd_amount: Decimal,
        reason: &str,
    ) -> Result<TradeFill, ExecutorError>;
}

//! Paper market - simulated venue and price source
//!
//! Prices follow a bounded random walk that advances on every ticker
//! request. Trades fill immediately at the current price against a cash
//! balance, so balances can be reconciled against the engine's book.

use async_trait::async_trait;
use meridian_core::math::{to_decimal_or_zero, to_f64};
use meridian_ports::{
    ExecutorError, PriceSource, PriceSourceError, Ticker, TradeExecutor, TradeFill,
};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cash asset
pub const CASH: &str = "USD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperMarketConfig {
    /// Starting prices per symbol
    pub initial_prices: HashMap<String, Decimal>,
    /// Max relative move per ticker request (0.0005 = 0.05%)
    pub price_volatility: Decimal,
    /// Half the quoted spread, relative to last
    pub half_spread: Decimal,
    /// Fee charged on notional
    pub fee_rate: Decimal,
    pub starting_cash: Decimal,
}

impl Default for PaperMarketConfig {
    fn default() -> Self {
        Self {
            initial_prices: HashMap::from([
                ("BTC-USD".to_string(), dec!(50000)),
                ("ETH-USD".to_string(), dec!(3000)),
            ]),
            price_volatility: dec!(0.0005),
            half_spread: dec!(0.0001),
            fee_rate: dec!(0.001),
            starting_cash: dec!(10000),
        }
    }
}

struct MarketState {
    prices: HashMap<String, Decimal>,
    balances: HashMap<String, Decimal>,
    rng: StdRng,
}

pub struct PaperMarket {
    config: PaperMarketConfig,
    state: Mutex<MarketState>,
}

fn base_asset(symbol: &str) -> &str {
    symbol.split(['-', '/']).next().unwrap_or(symbol)
}

impl PaperMarket {
    pub fn new(config: PaperMarketConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Reproducible price path
    pub fn with_seed(config: PaperMarketConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: PaperMarketConfig, rng: StdRng) -> Self {
        let balances = HashMap::from([(CASH.to_string(), config.starting_cash)]);
        Self {
            state: Mutex::new(MarketState {
                prices: config.initial_prices.clone(),
                balances,
                rng,
            }),
            config,
        }
    }

    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.state.lock().prices.get(symbol).copied()
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.state.lock().prices.insert(symbol.to_string(), price);
    }

    pub fn balance(&self, asset: &str) -> Decimal {
        self.state
            .lock()
            .balances
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Move `symbol` one random step and return the new price
    fn walk(&self, symbol: &str) -> Option<Decimal> {
        let mut state = self.state.lock();
        let current = state.prices.get(symbol).copied()?;
        let step: f64 = state.rng.gen_range(-1.0..1.0);
        let multiplier = 1.0 + to_f64(self.config.price_volatility) * step;
        let next = to_decimal_or_zero(to_f64(current) * multiplier, "paper price")
            .round_dp(8);
        let next = if next > Decimal::ZERO { next } else { current };
        state.prices.insert(symbol.to_string(), next);
        Some(next)
    }

    fn fill(&self, symbol: &str, usd_amount: Decimal, is_buy: bool) -> Result<TradeFill, ExecutorError> {
        if usd_amount <= Decimal::ZERO {
            return Err(ExecutorError::Rejected(format!("amount {} not positive", usd_amount)));
        }
        let mut state = self.state.lock();
        let price = state
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExecutorError::Rejected(format!("unknown symbol {}", symbol)))?;
        let size = usd_amount / price;
        let fee = usd_amount * self.config.fee_rate;
        let asset = base_asset(symbol).to_string();

        let cash = state.balances.get(CASH).copied().unwrap_or(Decimal::ZERO);
        let held = state.balances.get(&asset).copied().unwrap_or(Decimal::ZERO);
        if is_buy {
            if cash < usd_amount + fee {
                return Err(ExecutorError::Rejected(format!(
                    "insufficient cash: {} < {}",
                    cash,
                    usd_amount + fee
                )));
            }
            state.balances.insert(CASH.to_string(), cash - usd_amount - fee);
            state.balances.insert(asset, held + size);
        } else {
            if held < size {
                return Err(ExecutorError::Rejected(format!(
                    "insufficient {}: {} < {}",
                    asset, held, size
                )));
            }
            state.balances.insert(CASH.to_string(), cash + usd_amount - fee);
            state.balances.insert(asset, held - size);
        }

        log::info!(
            "[PAPER] {} {} {} @ {} (fee {})",
            if is_buy { "Bought" } else { "Sold" },
            size.round_dp(8),
            symbol,
            price,
            fee
        );
        Ok(TradeFill {
            success: true,
            filled_size: size,
            price,
            fee,
        })
    }
}

#[async_trait]
impl TradeExecutor for PaperMarket {
    async fn execute_buy(&self, symbol: &str, usd_amount: Decimal, _reason: &str) -> Result<TradeFill, ExecutorError> {
        self.fill(symbol, usd_amount, true)
    }

    async fn execute_sell(&self, symbol: &str, usd_amount: Decimal, _reason: &str) -> Result<TradeFill, ExecutorError> {
        self.fill(symbol, usd_amount, false)
    }
}

#[async_trait]
impl PriceSource for PaperMarket {
    async fn get_all_balances(&self) -> Result<HashMap<String, Decimal>, PriceSourceError> {
        Ok(self.state.lock().balances.clone())
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, PriceSourceError> {
        let last = self
            .walk(symbol)
            .ok_or_else(|| PriceSourceError::UnknownSymbol(symbol.to_string()))?;
        let half_spread = last * self.config.half_spread;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last,
            bid: last - half_spread,
            ask: last + half_spread,
        })
    }
}

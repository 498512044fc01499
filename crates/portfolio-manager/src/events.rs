//! Lifecycle events published by the portfolio manager
//!
//! Subscribers receive events through a `tokio::sync::broadcast` channel.
//! Slow subscribers may lag and miss events; publishing never blocks.

use chrono::{DateTime, Utc};
use meridian_core::Position;
use meridian_ports::SnapshotKind;
use meridian_rebalancer::RebalanceStrategy;
use meridian_risk_manager::RiskCheck;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PortfolioEvent {
    PositionOpened {
        position: Position,
    },
    /// Positions re-marked at a new price
    PositionUpdated {
        symbol: String,
        price: Decimal,
        position_ids: Vec<Uuid>,
    },
    PositionClosed {
        position_id: Uuid,
        symbol: String,
        closed_size: Decimal,
        realized_pnl: Decimal,
        fully_closed: bool,
    },
    RiskRejected {
        symbol: String,
        outcome: RiskCheck,
        reason: String,
        retry_after_secs: Option<u64>,
    },
    CoolingOffStarted {
        until: DateTime<Utc>,
    },
    RebalanceCompleted {
        result_id: Uuid,
        strategy: RebalanceStrategy,
        success: bool,
        trades: usize,
        cost: Decimal,
    },
    PersistenceFailed {
        document: SnapshotKind,
        error: String,
    },
}

impl PortfolioEvent {
    /// Symbol the event concerns, if any
    pub fn symbol(&self) -> Option<&str> {
        match self {
            PortfolioEvent::PositionOpened { position } => Some(position.symbol.as_str()),
            PortfolioEvent::PositionUpdated { symbol, .. }
            | PortfolioEvent::PositionClosed { symbol, .. }
            | PortfolioEvent::RiskRejected { symbol, .. } => Some(symbol.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_event_json_is_tagged() {
        let event = PortfolioEvent::PositionUpdated {
            symbol: "BTC-USD".into(),
            price: dec!(50000),
            position_ids: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "position_updated");
        assert_eq!(event.symbol(), Some("BTC-USD"));

        let event = PortfolioEvent::CoolingOffStarted { until: Utc::now() };
        assert!(event.symbol().is_none());
    }
}

//! Pre-trade check outcomes and recorded violations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a pre-trade check, ordered from permissive to strict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCheck {
    Allow,
    /// Allowed, but something looks off
    Warn,
    /// A configured limit would be exceeded
    Limit,
    /// Hard stop
    Block,
}

/// Outcome of [`RiskManager::check_position_risk`](crate::RiskManager::check_position_risk)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDecision {
    pub outcome: RiskCheck,
    pub reason: String,
    /// Seconds until a retry can succeed, when known
    pub retry_after_secs: Option<u64>,
}

impl RiskDecision {
    pub fn allow() -> Self {
        Self {
            outcome: RiskCheck::Allow,
            reason: "within limits".to_string(),
            retry_after_secs: None,
        }
    }

    pub fn warn(reason: impl Into<String>) -> Self {
        Self {
            outcome: RiskCheck::Warn,
            reason: reason.into(),
            retry_after_secs: None,
        }
    }

    pub fn limit(reason: impl Into<String>) -> Self {
        Self {
            outcome: RiskCheck::Limit,
            reason: reason.into(),
            retry_after_secs: None,
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            outcome: RiskCheck::Block,
            reason: reason.into(),
            retry_after_secs: None,
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    /// Can the trade go ahead?
    pub fn is_allowed(&self) -> bool {
        matches!(self.outcome, RiskCheck::Allow | RiskCheck::Warn)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    PositionSize,
    PositionPct,
    SymbolExposure,
    PositionCount,
    TradeFrequency,
    Volatility,
    DailyLoss,
    Drawdown,
}

impl ViolationKind {
    /// Breaches that start a cooling-off window
    pub fn starts_cooling_off(&self) -> bool {
        matches!(
            self,
            ViolationKind::Drawdown | ViolationKind::DailyLoss | ViolationKind::PositionCount
        )
    }
}

/// A limit breach, kept for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskViolation {
    pub kind: ViolationKind,
    pub symbol: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_ordering() {
        assert!(RiskCheck::Block > RiskCheck::Limit);
        assert!(RiskCheck::Limit > RiskCheck::Warn);
        assert!(RiskDecision::warn("high vol").is_allowed());
        assert!(!RiskDecision::limit("too big").is_allowed());
    }
}

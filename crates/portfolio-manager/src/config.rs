//! Engine configuration
//!
//! One JSON document aggregating every component's settings. Missing
//! fields fall back to defaults.

use crate::error::{Error, Result};
use meridian_analytics::AnalyticsConfig;
use meridian_rebalancer::RebalanceConfig;
use meridian_risk_manager::RiskLimits;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest window any duration setting may ask for
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 86_400;

/// Background task periods. Zero disables a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Portfolio-value sampling and risk-limit audit
    pub value_sample_secs: u64,
    /// Analytics recompute and cache sweep
    pub analytics_secs: u64,
    /// Rebalance opportunity scan
    pub rebalance_check_secs: u64,
    /// Price refresh from the price source
    pub price_refresh_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            value_sample_secs: 300,
            analytics_secs: 3600,
            rebalance_check_secs: 300,
            price_refresh_secs: 60,
        }
    }
}

fn period(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl SchedulerConfig {
    pub fn value_sample_period(&self) -> Option<Duration> {
        period(self.value_sample_secs)
    }

    pub fn analytics_period(&self) -> Option<Duration> {
        period(self.analytics_secs)
    }

    pub fn rebalance_check_period(&self) -> Option<Duration> {
        period(self.rebalance_check_secs)
    }

    pub fn price_refresh_period(&self) -> Option<Duration> {
        period(self.price_refresh_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Snapshot documents live here
    pub data_dir: PathBuf,
    /// Exports are written here
    pub export_dir: PathBuf,
    /// Periodic backup export; zero disables
    pub backup_interval_hours: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            export_dir: PathBuf::from("./exports"),
            backup_interval_hours: 24,
        }
    }
}

impl PersistenceConfig {
    pub fn backup_period(&self) -> Option<Duration> {
        period(self.backup_interval_hours.saturating_mul(3600))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capital the portfolio value is measured against
    pub initial_capital: Decimal,
    pub risk: RiskLimits,
    pub rebalance: RebalanceConfig,
    pub analytics: AnalyticsConfig,
    pub scheduler: SchedulerConfig,
    pub persistence: PersistenceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: dec!(10000),
            risk: RiskLimits::default(),
            rebalance: RebalanceConfig::default(),
            analytics: AnalyticsConfig::default(),
            scheduler: SchedulerConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_capital <= Decimal::ZERO {
            return Err(Error::InvalidConfig(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if self.risk.min_position_size_usd > self.risk.max_position_size_usd {
            return Err(Error::InvalidConfig(
                "min_position_size_usd above max_position_size_usd".into(),
            ));
        }
        if self.rebalance.min_drift_pct > self.rebalance.max_drift_pct {
            return Err(Error::InvalidConfig("min_drift_pct above max_drift_pct".into()));
        }
        let durations = [
            ("risk.cooling_off_secs", self.risk.cooling_off_secs),
            ("risk.volatility_cache_secs", self.risk.volatility_cache_secs),
            ("rebalance.rebalance_interval_secs", self.rebalance.rebalance_interval_secs),
            ("analytics.cache_ttl_secs", self.analytics.cache_ttl_secs),
            (
                "persistence.backup_interval_hours",
                self.persistence.backup_interval_hours.saturating_mul(3600),
            ),
        ];
        for (name, secs) in durations {
            if secs > MAX_DURATION_SECS {
                return Err(Error::InvalidConfig(format!(
                    "{} spans {}s, limit {}s",
                    name, secs, MAX_DURATION_SECS
                )));
            }
        }
        Ok(())
    }
}

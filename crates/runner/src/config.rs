//! Runner configuration
//!
//! ```json
//! {
//!   "engine": { "initial_capital": "10000", "scheduler": { "price_refresh_secs": 30 } },
//!   "paper": { "starting_cash": "10000" },
//!   "targets": { "BTC-USD": 0.6, "ETH-USD": 0.4 }
//! }
//! ```

use crate::error::Result;
use crate::paper::PaperMarketConfig;
use meridian_portfolio_manager::EngineConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "MERIDIAN_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub engine: EngineConfig,
    pub paper: PaperMarketConfig,
    /// Allocation applied when none was persisted
    pub targets: BTreeMap<String, f64>,
}

impl RunnerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.engine.validate()?;
        Ok(config)
    }
}

/// First CLI argument, else `MERIDIAN_CONFIG`
pub fn config_path(mut args: impl Iterator<Item = String>, env: Option<String>) -> Option<PathBuf> {
    args.next().or(env).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_config_path_precedence() {
        let args = vec!["a.json".to_string()].into_iter();
        assert_eq!(config_path(args, Some("b.json".into())), Some(PathBuf::from("a.json")));
        assert_eq!(
            config_path(std::iter::empty(), Some("b.json".into())),
            Some(PathBuf::from("b.json"))
        );
        assert_eq!(config_path(std::iter::empty(), None), None);
    }

    #[test]
    fn test_sections_default_independently() {
        let config: RunnerConfig =
            serde_json::from_str(r#"{"paper": {"starting_cash": "500"}, "targets": {"BTC-USD": 1.0}}"#).unwrap();
        assert_eq!(config.paper.starting_cash, dec!(500));
        assert_eq!(config.paper.fee_rate, dec!(0.001));
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.targets.len(), 1);
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// How long computed period metrics stay fresh
    pub cache_ttl_secs: u64,
    /// Annual risk-free rate as a fraction
    pub risk_free_rate: f64,
    /// Symbol whose price series is the benchmark
    pub benchmark_symbol: Option<String>,
    /// Portfolio-value samples kept
    pub value_history_len: usize,
    /// Benchmark prices kept
    pub benchmark_history_len: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            risk_free_rate: 0.02,
            benchmark_symbol: Some("BTC-USD".to_string()),
            value_history_len: 20_000,
            benchmark_history_len: 20_000,
        }
    }
}

impl AnalyticsConfig {
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs as i64)
    }
}

//! Reporting periods for analytics

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Reporting window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Since UTC midnight
    Intraday,
    /// Last 24 hours
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
    /// Since the engine started
    Inception,
}

impl Period {
    pub const ALL: [Period; 7] = [
        Period::Intraday,
        Period::Daily,
        Period::Weekly,
        Period::Monthly,
        Period::Quarterly,
        Period::Yearly,
        Period::Inception,
    ];

    /// Start of the window ending at `now`
    pub fn start(&self, now: DateTime<Utc>, inception: DateTime<Utc>) -> DateTime<Utc> {
        let start = match self {
            Period::Intraday => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc())
                .unwrap_or(now),
            Period::Daily => now - Duration::hours(24),
            Period::Weekly => now - Duration::days(7),
            Period::Monthly => now - Duration::days(30),
            Period::Quarterly => now - Duration::days(90),
            Period::Yearly => now - Duration::days(365),
            Period::Inception => inception,
        };
        start.max(inception)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Intraday => "intraday",
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
            Period::Quarterly => "quarterly",
            Period::Yearly => "yearly",
            Period::Inception => "inception",
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

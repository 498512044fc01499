//! Data export
//!
//! JSON exports carry the full engine picture. CSV exports carry one row
//! per position, open positions first.

use crate::error::{Error, Result};
use crate::store::atomic_write;
use chrono::{DateTime, Utc};
use meridian_analytics::PerformanceReport;
use meridian_core::Position;
use meridian_position_tracker::PortfolioSummary;
use meridian_rebalancer::RebalanceResult;
use meridian_risk_manager::RiskReport;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(Error::InvalidConfig(format!("unknown export format: {}", other))),
        }
    }
}

/// Everything an export contains
#[derive(Debug, Clone, Serialize)]
pub struct ExportDocument {
    pub generated_at: DateTime<Utc>,
    pub summary: PortfolioSummary,
    pub open_positions: Vec<Position>,
    pub closed_positions: Vec<Position>,
    pub risk: RiskReport,
    pub performance: PerformanceReport,
    pub rebalance_history: Vec<RebalanceResult>,
    pub target_allocations: BTreeMap<String, Decimal>,
}

const CSV_HEADER: &str = "id,symbol,side,status,original_size,current_size,average_entry_price,\
current_price,unrealized_pnl,realized_pnl,fees,strategy,created_at,closed_at";

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Positions as CSV rows
pub fn positions_csv<'a>(positions: impl IntoIterator<Item = &'a Position>) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for p in positions {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            p.id,
            csv_field(&p.symbol),
            p.side.as_str(),
            p.status.as_str(),
            p.original_size,
            p.current_size,
            p.average_entry_price,
            p.current_price,
            p.unrealized_pnl,
            p.realized_pnl,
            p.fees,
            csv_field(p.strategy.as_deref().unwrap_or("")),
            p.created_at.to_rfc3339(),
            p.closed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        );
    }
    out
}

/// Write `document` under `dir` and return the file path
pub fn write_export(dir: &Path, document: &ExportDocument, format: ExportFormat) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let name = format!(
        "portfolio_{}.{}",
        document.generated_at.format("%Y%m%d_%H%M%S"),
        format.extension()
    );
    let path = dir.join(name);

    let data = match format {
        ExportFormat::Json => serde_json::to_vec_pretty(document)?,
        ExportFormat::Csv => {
            positions_csv(document.open_positions.iter().chain(&document.closed_positions)).into_bytes()
        }
    };
    atomic_write(&path, &data)?;
    Ok(path)
}

use crate::error::StoreError;
use serde::{Deserialize, Serialize};

/// One logical document per persisted concern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Positions,
    ClosedPositions,
    RebalanceHistory,
    TargetAllocations,
    Config,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 5] = [
        SnapshotKind::Positions,
        SnapshotKind::ClosedPositions,
        SnapshotKind::RebalanceHistory,
        SnapshotKind::TargetAllocations,
        SnapshotKind::Config,
    ];

    /// Document name
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Positions => "positions",
            SnapshotKind::ClosedPositions => "closed_positions",
            SnapshotKind::RebalanceHistory => "rebalance_history",
            SnapshotKind::TargetAllocations => "target_allocations",
            SnapshotKind::Config => "config",
        }
    }
}

/// Port for durable key-value snapshots
///
/// Each save replaces the whole document for that concern.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, kind: SnapshotKind, document: &serde_json::Value) -> Result<(), StoreError>;

    /// `None` when nothing has been written yet
    fn load(&self, kind: SnapshotKind) -> Result<Option<serde_json::Value>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ensure traits are object-safe
    fn _assert_store_object_safe(_: &dyn SnapshotStore) {}
    fn _assert_executor_object_safe(_: &dyn crate::TradeExecutor) {}
    fn _assert_price_source_object_safe(_: &dyn crate::PriceSource) {}
    fn _assert_clock_object_safe(_: &dyn crate::Clock) {}

    #[test]
    fn test_document_names_unique() {
        let mut names: Vec<&str> = SnapshotKind::ALL.iter().map(|k| k.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), SnapshotKind::ALL.len());
    }
}

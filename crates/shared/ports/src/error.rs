use thiserror::Error;

/// Failures reported by the trade executor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Trade executor unavailable: {0}")]
    Unavailable(String),

    #[error("Trade rejected by venue: {0}")]
    Rejected(String),

    #[error("Trade timed out after {0} ms")]
    Timeout(u64),
}

/// Failures reported by the balance/price source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceSourceError {
    #[error("Price source unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),
}

/// Failures writing or reading durable snapshots
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

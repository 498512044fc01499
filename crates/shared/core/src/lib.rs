//! Meridian Core Domain
//!
//! Pure domain types for the Meridian portfolio engine.
//! This crate contains no async, no I/O, and is 100% unit testable.
//!
//! - **entities**: positions and their lifecycle
//! - **values**: money/time aliases
//! - **period**: reporting windows
//! - **math**: guarded arithmetic (division, float conversion)
//! - **stats**: return statistics shared by risk and analytics
//! - **cache**: TTL cache with explicit eviction

pub mod cache;
pub mod entities;
pub mod math;
pub mod period;
pub mod stats;
pub mod values;

// Re-export commonly used types at crate root
pub use cache::TtlCache;
pub use entities::{Position, PositionError, PositionSide, PositionStatus};
pub use math::ArithmeticError;
pub use period::Period;
pub use values::{Price, Quantity, Symbol, Timestamp};

//! Meridian Clock Infrastructure
//!
//! - [`SystemClock`]: wall-clock time for production
//! - [`ManualClock`]: frozen time that only moves when told to, for
//!   deterministic tests of cooling-off windows, TTL caches and periods
//!
//! ## Usage
//!
//! ```ignore
//! use meridian_clock::ManualClock;
//! use chrono::Duration;
//!
//! let clock = ManualClock::starting_now();
//! clock.advance(Duration::minutes(5));
//! ```

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

// Re-export the Clock trait for convenience
pub use meridian_ports::Clock;

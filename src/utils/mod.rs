//! Utilities module for logging, errors and bounded loading
//!
//! This module provides:
//! - Structured logging with tracing
//! - Error handling types
//! - Deadline-bounded artifact loading

pub mod error;
pub mod loading;
pub mod logging;

// Re-export main types for convenience
pub use error::{AdvisorError, Result, ResultExt};
pub use loading::load_with_timeout;
pub use logging::init_logging;

/// Round `value` to `decimals` places, half away from zero.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Whether an environment-style flag value means "on".
///
/// Accepts `true`, `1` and `yes` in any case; everything else is off.
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

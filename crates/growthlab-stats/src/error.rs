//! Error types for growthlab-stats

use thiserror::Error;

/// Errors raised by the numeric kernel
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    /// A sample required by the computation was empty
    #[error("Sample '{name}' is empty")]
    EmptySample { name: &'static str },

    /// A sample contained NaN or an infinity
    #[error("Sample '{name}' contains non-finite values")]
    NonFinite { name: &'static str },
}

/// Result type alias for kernel operations
pub type StatsResult<T> = Result<T, StatsError>;

/// Check that a sample is non-empty and fully finite
pub fn require_finite(name: &'static str, data: &[f64]) -> StatsResult<()> {
    if data.is_empty() {
        return Err(StatsError::EmptySample { name });
    }
    if data.iter().any(|x| !x.is_finite()) {
        return Err(StatsError::NonFinite { name });
    }
    Ok(())
}

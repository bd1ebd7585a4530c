//! Error types for growthlab-core
//!
//! Provides error handling for:
//! - Configuration loading and preset resolution
//! - Malformed subject series
//! - Growth-model fitting failures, reported per subject
//! - Parallel batch execution, reported per batch

use growthlab_stats::StatsError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for growthlab operations
#[derive(Error, Debug)]
pub enum GrowthlabError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Input data errors
    #[error("Invalid input data: {0}")]
    Data(#[from] DataError),

    /// Numeric kernel errors
    #[error("Statistics error: {0}")]
    Stats(#[from] StatsError),
}

/// Errors related to configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Preset name is not one of the known presets
    #[error("Unknown outlier preset: {0}")]
    UnknownPreset(String),

    /// Filtering level name is not recognized
    #[error("Unknown filtering level: {0}")]
    UnknownFilteringLevel(String),

    /// A numeric setting is out of range
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },

    /// TOML parse error
    #[error("Config parse error: {0}")]
    Parse(String),

    /// I/O error while reading a config file
    #[error("Config I/O error: {0}")]
    Io(String),
}

/// Errors related to a subject's series
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// Day and measurement sequences differ in length
    #[error("Subject {subject_id}: {time_points} time points but {measurements} measurements")]
    LengthMismatch {
        subject_id: String,
        time_points: usize,
        measurements: usize,
    },

    /// Days are not strictly increasing
    #[error("Subject {subject_id}: day at index {index} does not increase")]
    NonIncreasingDays { subject_id: String, index: usize },

    /// A day or measurement is NaN or infinite
    #[error("Subject {subject_id}: non-finite value at index {index}")]
    NonFinite { subject_id: String, index: usize },

    /// Two subjects share an id
    #[error("Duplicate subject id: {0}")]
    DuplicateSubject(String),
}

/// Reasons an exponential fit cannot be produced
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FitError {
    /// Fewer than three positive measurements
    #[error("Insufficient data points")]
    InsufficientData { usable: usize },

    /// Day and measurement sequences differ in length
    #[error("Length mismatch: {time_points} time points, {measurements} measurements")]
    LengthMismatch {
        time_points: usize,
        measurements: usize,
    },

    /// All usable points share the same day
    #[error("Degenerate regression: zero variance in time")]
    DegenerateTime,

    /// All usable measurements are identical, so R² is undefined
    #[error("Degenerate regression: zero variance in log measurements")]
    ZeroVariance,

    /// The regression produced NaN or an infinity
    #[error("Regression produced a non-finite result")]
    NonFinite,
}

/// Errors from the parallel execution boundary
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BatchError {
    /// The worker reported a failure
    #[error("Worker failed on {task}: {message}")]
    WorkerFailed { task: String, message: String },

    /// The worker answered with the wrong kind of output, or with flags or
    /// a matrix that do not belong to the task
    #[error("Malformed response for {task}")]
    MalformedResponse { task: String },

    /// Subject range is outside the input
    #[error("Subject range {start}..{end} out of bounds for {len} subjects")]
    InvalidRange { start: usize, end: usize, len: usize },

    /// No subject belongs to the requested group
    #[error("Unknown group: {group}")]
    UnknownGroup { group: String },
}

/// Result type alias for growthlab operations
pub type Result<T> = std::result::Result<T, GrowthlabError>;

/// Result type alias for config operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for batch operations
pub type BatchResult<T> = std::result::Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message() {
        let err = FitError::InsufficientData { usable: 2 };
        assert_eq!(err.to_string(), "Insufficient data points");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::UnknownPreset("aggressive".to_string());
        assert!(err.to_string().contains("aggressive"));
    }

    #[test]
    fn test_data_error_display() {
        let err = DataError::LengthMismatch {
            subject_id: "m1".to_string(),
            time_points: 4,
            measurements: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("m1"));
        assert!(msg.contains('4'));
    }

    #[test]
    fn test_batch_error_display() {
        let err = BatchError::InvalidRange {
            start: 4,
            end: 9,
            len: 5,
        };
        assert!(err.to_string().contains("4..9"));
    }

    #[test]
    fn test_error_conversion() {
        let err: GrowthlabError = DataError::DuplicateSubject("m1".to_string()).into();
        assert!(matches!(err, GrowthlabError::Data(DataError::DuplicateSubject(_))));
        assert_eq!(err.to_string(), "Invalid input data: Duplicate subject id: m1");
    }

    #[test]
    fn test_fit_error_serializes_with_kind() {
        let json = serde_json::to_string(&FitError::InsufficientData { usable: 1 }).unwrap();
        assert!(json.contains("\"kind\":\"insufficientData\""));
    }
}

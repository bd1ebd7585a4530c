//! growthlab-stats - Numeric kernel for longitudinal growth analysis
//!
//! This crate provides the statistical primitives every growthlab stage
//! builds on:
//!
//! - **Summary**: mean, sample variance, median
//! - **Quantiles**: linear-interpolated percentiles and IQR fences
//! - **Rates**: log-ratio growth rate between two measurements
//! - **Compare**: Mann-Whitney U, Cohen's d, effect-size and significance labels
//!
//! # Design Philosophy
//!
//! Every function is pure and total over its input: degenerate input yields
//! `None` or a [`StatsError`] instead of `NaN` or infinities, so nothing
//! non-finite leaks into downstream scientific results.

pub mod compare;
pub mod error;
pub mod quantile;
pub mod rate;
pub mod summary;

pub use compare::*;
pub use error::*;
pub use quantile::*;
pub use rate::*;
pub use summary::*;

// Setup UniFFI when the feature is enabled
#[cfg(feature = "uniffi")]
uniffi::setup_scaffolding!();

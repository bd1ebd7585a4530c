//! growthlab-core - Analysis engine for longitudinal growth measurements
//!
//! This crate turns per-subject measurement series (for example tumor volume
//! over days, grouped by treatment arm) into quality-assessed exponential
//! growth models and group-level comparative statistics.
//!
//! # Key Components
//!
//! - **Outlier**: sequential, intra-subject and cross-subject anomaly flags
//! - **Filtering**: severity-based include/exclude decisions and the two
//!   cleaned views (whole-subject and single-point exclusion)
//! - **Fit**: closed-form exponential fits in log space
//! - **Matrix**: pairwise growth-rate (TGR) matrices per group
//! - **Parallel**: batch supervisor with in-process recovery
//! - **Analysis**: the pipeline tying the stages together
//!
//! # Determinism
//!
//! Every stage is a pure function of its input. With the `parallel` feature
//! the batch pathway produces the same output as the synchronous one.

pub mod analysis;
pub mod config;
pub mod error;
pub mod filtering;
pub mod fit;
pub mod matrix;
pub mod outlier;
pub mod parallel;
pub mod types;

pub use analysis::{
    run, run_with_worker, AnalysisOutput, AnalysisSummary, ComparisonScope, LabeledComparison,
};
pub use config::*;
pub use error::*;
pub use filtering::*;
pub use fit::{fit, fit_subject, GrowthModel, ModelOutcome};
pub use matrix::{build_group_matrices, build_matrix, IndividualRate, TgrMatrix};
pub use outlier::{OutlierDetector, OutlierReport, SubjectAnnotation};
pub use parallel::{
    execute_task, BatchFailure, BatchOutput, InProcessWorker, MatrixReport, ParallelReport,
    Supervisor, Worker, WorkerRequest, WorkerTask,
};
pub use types::*;

pub use growthlab_stats::{ComparisonResult, EffectSize, Significance};

// Setup UniFFI when the feature is enabled
#[cfg(feature = "uniffi")]
uniffi::setup_scaffolding!();

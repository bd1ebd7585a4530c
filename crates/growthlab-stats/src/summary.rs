//! Summary statistics for measurement samples
//!
//! Provides the location and spread measures used across growthlab:
//! - Mean, sample variance, standard deviation
//! - Min, max
//! - Median

use serde::{Deserialize, Serialize};

/// Summary statistics for a numeric sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryStats {
    /// Number of finite values
    pub count: usize,
    /// Number of NaN or infinite values that were skipped
    pub missing: usize,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
    /// Mean (average)
    pub mean: f64,
    /// Sample variance (n - 1 denominator), 0 for a single value
    pub variance: f64,
    /// Sample standard deviation
    pub std_dev: f64,
    /// Median (50th percentile)
    pub median: f64,
}

impl SummaryStats {
    /// Compute summary statistics from data
    ///
    /// Returns `None` when the sample holds no finite value.
    pub fn from_data(data: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
        let missing = data.len() - sorted.len();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let variance = if count > 1 {
            sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (count - 1) as f64
        } else {
            0.0
        };

        Some(Self {
            count,
            missing,
            min: sorted[0],
            max: sorted[count - 1],
            mean,
            variance,
            std_dev: variance.sqrt(),
            median: median_sorted(&sorted),
        })
    }
}

/// Arithmetic mean of the finite values, `None` if there are none
pub fn mean(data: &[f64]) -> Option<f64> {
    let (sum, n) = data
        .iter()
        .filter(|x| x.is_finite())
        .fold((0.0, 0usize), |(s, n), &x| (s + x, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Median of an already sorted, non-empty slice
pub(crate) fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

//! Two-sample comparison: Mann-Whitney U with Cohen's d
//!
//! The rank test answers whether two samples of growth rates come from the
//! same distribution without assuming normality; Cohen's d reports how far
//! apart their means sit in pooled-standard-deviation units.
//!
//! ## Algorithm
//!
//! 1. Pool both samples and rank them, giving tied values their average rank
//! 2. `U1 = R1 - n1(n1 + 1)/2`, `U2 = n1*n2 - U1`, `U = min(U1, U2)`
//! 3. Normal approximation with tie-corrected variance for the two-tailed p
//!
//! The significance level is fixed at [`SIGNIFICANCE_LEVEL`].

use serde::{Deserialize, Serialize};

use crate::error::{require_finite, StatsResult};
use crate::summary::{median_sorted, SummaryStats};

/// Fixed alpha for [`ComparisonResult::significant`]
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Magnitude class of Cohen's d
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
pub enum EffectSize {
    /// |d| < 0.2
    Negligible,
    /// 0.2 <= |d| < 0.5
    Small,
    /// 0.5 <= |d| < 0.8
    Medium,
    /// |d| >= 0.8
    Large,
}

impl EffectSize {
    /// Classify a Cohen's d value by its absolute size
    pub fn from_cohens_d(d: f64) -> Self {
        let d = d.abs();
        if d < 0.2 {
            Self::Negligible
        } else if d < 0.5 {
            Self::Small
        } else if d < 0.8 {
            Self::Medium
        } else {
            Self::Large
        }
    }
}

/// Star notation for a p-value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
pub enum Significance {
    /// p < 0.001
    VeryHigh,
    /// p < 0.01
    High,
    /// p < 0.05
    Significant,
    /// p >= 0.05
    NotSignificant,
}

impl Significance {
    /// Map a p-value onto its significance class
    pub fn from_p_value(p: f64) -> Self {
        if p < 0.001 {
            Self::VeryHigh
        } else if p < 0.01 {
            Self::High
        } else if p < SIGNIFICANCE_LEVEL {
            Self::Significant
        } else {
            Self::NotSignificant
        }
    }

    /// Conventional star label (`***`, `**`, `*`, `ns`)
    pub fn stars(&self) -> &'static str {
        match self {
            Self::VeryHigh => "***",
            Self::High => "**",
            Self::Significant => "*",
            Self::NotSignificant => "ns",
        }
    }
}

/// Mann-Whitney U statistics for two samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MannWhitney {
    /// U of the first sample
    pub u1: f64,
    /// U of the second sample
    pub u2: f64,
    /// min(U1, U2)
    pub u: f64,
    /// Normal-approximation z-score of `u`, never positive
    ///
    /// Taken from the smaller U, so it carries magnitude only. Which sample
    /// ranks higher is read from `u1` against `u2`.
    pub z: f64,
    /// Two-tailed p-value
    pub p: f64,
}

/// Result of comparing two numeric samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    /// min(U1, U2)
    pub u: f64,
    pub u1: f64,
    pub u2: f64,
    /// z-score of `u`, at most 0; direction is in `u1`/`u2` and `cohens_d`
    pub z: f64,
    pub p: f64,
    pub cohens_d: f64,
    pub effect_size: EffectSize,
    pub significance: Significance,
    /// Whether p < [`SIGNIFICANCE_LEVEL`]
    pub significant: bool,
    pub median1: f64,
    pub median2: f64,
    pub n1: usize,
    pub n2: usize,
}

/// Compare two samples with a Mann-Whitney U test and Cohen's d
///
/// Both samples must be non-empty and finite.
pub fn compare(sample_a: &[f64], sample_b: &[f64]) -> StatsResult<ComparisonResult> {
    require_finite("sample_a", sample_a)?;
    require_finite("sample_b", sample_b)?;

    let mw = mann_whitney_u(sample_a, sample_b);
    let d = cohens_d(sample_a, sample_b);

    let mut sorted_a = sample_a.to_vec();
    sorted_a.sort_by(f64::total_cmp);
    let mut sorted_b = sample_b.to_vec();
    sorted_b.sort_by(f64::total_cmp);

    Ok(ComparisonResult {
        u: mw.u,
        u1: mw.u1,
        u2: mw.u2,
        z: mw.z,
        p: mw.p,
        cohens_d: d,
        effect_size: EffectSize::from_cohens_d(d),
        significance: Significance::from_p_value(mw.p),
        significant: mw.p < SIGNIFICANCE_LEVEL,
        median1: median_sorted(&sorted_a),
        median2: median_sorted(&sorted_b),
        n1: sample_a.len(),
        n2: sample_b.len(),
    })
}

/// Mann-Whitney U test over two finite samples
///
/// Callers are expected to pass non-empty samples; with an empty side the
/// statistic degenerates to `U = 0, z = 0, p = 1`.
pub fn mann_whitney_u(sample_a: &[f64], sample_b: &[f64]) -> MannWhitney {
    let n1 = sample_a.len();
    let n2 = sample_b.len();
    let n = n1 + n2;

    // Group 0 = sample_a, group 1 = sample_b
    let mut pooled: Vec<(f64, usize)> = sample_a
        .iter()
        .map(|&x| (x, 0))
        .chain(sample_b.iter().map(|&x| (x, 1)))
        .collect();
    pooled.sort_by(|a, b| a.0.total_cmp(&b.0));

    let (ranks, tie_term) = average_ranks(&pooled);
    let r1: f64 = ranks
        .iter()
        .zip(&pooled)
        .filter(|(_, (_, group))| *group == 0)
        .map(|(rank, _)| rank)
        .sum();

    let u1 = r1 - (n1 * (n1 + 1)) as f64 / 2.0;
    let u2 = (n1 * n2) as f64 - u1;
    let u = u1.min(u2);

    let mu = (n1 * n2) as f64 / 2.0;
    let variance = if n > 1 {
        (n1 * n2) as f64 / 12.0 * ((n + 1) as f64 - tie_term / (n * (n - 1)) as f64)
    } else {
        0.0
    };
    let sigma = variance.max(0.0).sqrt();

    let (z, p) = if sigma > 0.0 {
        let z = (u - mu) / sigma;
        let p = (2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0);
        (z, p)
    } else {
        (0.0, 1.0)
    };

    MannWhitney { u1, u2, u, z, p }
}

/// Average ranks (1-based) of a sorted pooled sample, plus the tie
/// correction term `sum(t^3 - t)` over tie groups
fn average_ranks(sorted: &[(f64, usize)]) -> (Vec<f64>, f64) {
    let mut ranks = Vec::with_capacity(sorted.len());
    let mut tie_term = 0.0;
    let mut i = 0;

    while i < sorted.len() {
        let mut j = i;
        while j < sorted.len() && sorted[j].0 == sorted[i].0 {
            j += 1;
        }

        // Positions i..j hold ranks (i+1)..=j
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        ranks.extend(std::iter::repeat(avg_rank).take(j - i));

        let t = (j - i) as f64;
        tie_term += t * t * t - t;
        i = j;
    }

    (ranks, tie_term)
}

/// Cohen's d with pooled sample standard deviation
///
/// Positive when `sample_a` has the larger mean. Returns 0 when the pooled
/// deviation is zero or undefined (fewer than two observations overall).
pub fn cohens_d(sample_a: &[f64], sample_b: &[f64]) -> f64 {
    let (Some(a), Some(b)) = (SummaryStats::from_data(sample_a), SummaryStats::from_data(sample_b))
    else {
        return 0.0;
    };

    let dof = a.count + b.count;
    if dof <= 2 {
        return 0.0;
    }
    let pooled_var = ((a.count - 1) as f64 * a.variance + (b.count - 1) as f64 * b.variance)
        / (dof - 2) as f64;
    let pooled_sd = pooled_var.sqrt();
    if !pooled_sd.is_finite() || pooled_sd <= 0.0 {
        return 0.0;
    }
    (a.mean - b.mean) / pooled_sd
}

/// Standard normal CDF
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Error function (Abramowitz and Stegun 7.1.26, |error| < 1.5e-7)
fn erf(x: f64) -> f64 {
    let a1 = 0.254_829_592;
    let a2 = -0.284_496_736;
    let a3 = 1.421_413_741;
    let a4 = -1.453_152_027;
    let a5 = 1.061_405_429;
    let p = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

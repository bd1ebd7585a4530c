//! Percentiles and interquartile-range fences
//!
//! Percentiles interpolate linearly between order statistics: for a sorted
//! sample of n values the p-th percentile sits at rank `p/100 * (n - 1)`.
//!
//! IQR fences are `[Q1 - k * IQR, Q3 + k * IQR]` with a caller-supplied `k`.

use serde::{Deserialize, Serialize};

/// Percentile (0 to 100) of the finite values in `data`
///
/// Returns `None` for an empty sample or a percentile outside [0, 100].
pub fn percentile(data: &[f64], p: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    percentile_sorted(&sorted, p)
}

/// Percentile of an already sorted slice
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=100.0).contains(&p) {
        return None;
    }

    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return Some(sorted[lower]);
    }
    let weight = rank - lower as f64;
    Some(sorted[lower] * (1.0 - weight) + sorted[upper] * weight)
}

/// First quartile, median and third quartile of a sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quartiles {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
}

impl Quartiles {
    /// Compute quartiles of the finite values in `data`
    pub fn from_data(data: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        Some(Self {
            q1: percentile_sorted(&sorted, 25.0)?,
            median: percentile_sorted(&sorted, 50.0)?,
            q3: percentile_sorted(&sorted, 75.0)?,
        })
    }

    /// Get the interquartile range
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    /// Fences scaled by `k`
    pub fn fences(&self, k: f64) -> IqrBounds {
        let iqr = self.iqr();
        IqrBounds {
            lower: self.q1 - k * iqr,
            upper: self.q3 + k * iqr,
            quartiles: *self,
            k,
        }
    }
}

/// Outlier fences derived from a sample's quartiles
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IqrBounds {
    /// Q1 - k * IQR
    pub lower: f64,
    /// Q3 + k * IQR
    pub upper: f64,
    /// Quartiles the fences were built from
    pub quartiles: Quartiles,
    /// Sensitivity multiplier
    pub k: f64,
}

impl IqrBounds {
    /// Whether `x` lies strictly outside the fences
    pub fn is_outlier(&self, x: f64) -> bool {
        x < self.lower || x > self.upper
    }
}

/// IQR fences `[Q1 - k * IQR, Q3 + k * IQR]` for the finite values in `data`
pub fn iqr_bounds(data: &[f64], k: f64) -> Option<IqrBounds> {
    Quartiles::from_data(data).map(|q| q.fences(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 1.0)]
    #[case(25.0, 2.0)]
    #[case(50.0, 3.0)]
    #[case(75.0, 4.0)]
    #[case(100.0, 5.0)]
    #[case(10.0, 1.4)]
    fn test_percentile_linear(#[case] p: f64, #[case] expected: f64) {
        let data = [5.0, 1.0, 4.0, 2.0, 3.0];
        let got = percentile(&data, p).unwrap();
        assert!((got - expected).abs() < 1e-12, "p{p}: {got} != {expected}");
    }

    #[test]
    fn test_percentile_out_of_range() {
        assert!(percentile(&[1.0, 2.0], -1.0).is_none());
        assert!(percentile(&[1.0, 2.0], 101.0).is_none());
        assert!(percentile(&[], 50.0).is_none());
    }

    #[test]
    fn test_quartiles_even_sample() {
        let q = Quartiles::from_data(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((q.q1 - 1.75).abs() < 1e-12);
        assert!((q.median - 2.5).abs() < 1e-12);
        assert!((q.q3 - 3.25).abs() < 1e-12);
        assert!((q.iqr() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_iqr_bounds_flags_extreme() {
        let data = [10.0, 11.0, 12.0, 13.0, 14.0, 100.0];
        let bounds = iqr_bounds(&data, 1.5).unwrap();
        assert!(bounds.is_outlier(100.0));
        assert!(!bounds.is_outlier(12.0));
    }

    #[test]
    fn test_zero_sensitivity_uses_quartiles() {
        let bounds = iqr_bounds(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.0).unwrap();
        assert_eq!(bounds.lower, 2.0);
        assert_eq!(bounds.upper, 4.0);
        assert!(bounds.is_outlier(1.0));
        assert!(!bounds.is_outlier(2.0));
    }

    #[test]
    fn test_constant_sample_has_no_outliers() {
        let bounds = iqr_bounds(&[7.0; 6], 1.5).unwrap();
        assert!(!bounds.is_outlier(7.0));
        assert!(bounds.is_outlier(7.5));
    }
}

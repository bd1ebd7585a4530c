//! Log-ratio growth rates
//!
//! The growth rate between two measurements is
//!
//! ```text
//! r = ln(v_to / v_from) / (day_to - day_from)
//! ```
//!
//! which is the exponent of an exponential passing through both points.

/// Growth rate between two measurements
///
/// Returns `None` when either value is non-positive or non-finite, or when
/// no time elapsed between the two days.
pub fn log_growth_rate(from_day: f64, from_value: f64, to_day: f64, to_value: f64) -> Option<f64> {
    let usable = |v: f64| v.is_finite() && v > 0.0;
    if !usable(from_value) || !usable(to_value) {
        return None;
    }
    let elapsed = to_day - from_day;
    if !elapsed.is_finite() || elapsed <= 0.0 {
        return None;
    }
    let r = (to_value / from_value).ln() / elapsed;
    r.is_finite().then_some(r)
}

/// Natural log of every strictly positive, finite value, paired with its index
pub fn positive_logs(values: &[f64]) -> Vec<(usize, f64)> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v > 0.0 && v.is_finite())
        .map(|(i, v)| (i, v.ln()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halving_over_three_days() {
        let r = log_growth_rate(0.0, 100.0, 3.0, 50.0).unwrap();
        assert!((r - (0.5f64).ln() / 3.0).abs() < 1e-12);
        assert!((r + 0.231).abs() < 1e-3);
    }

    #[test]
    fn test_doubling_rate() {
        let r = log_growth_rate(2.0, 10.0, 4.0, 20.0).unwrap();
        assert!((r - std::f64::consts::LN_2 / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(log_growth_rate(0.0, 0.0, 3.0, 50.0).is_none());
        assert!(log_growth_rate(0.0, 10.0, 3.0, -1.0).is_none());
        assert!(log_growth_rate(3.0, 10.0, 3.0, 20.0).is_none());
        assert!(log_growth_rate(5.0, 10.0, 3.0, 20.0).is_none());
        assert!(log_growth_rate(0.0, f64::NAN, 3.0, 20.0).is_none());
    }

    #[test]
    fn test_positive_logs_skips_non_positive() {
        let logs = positive_logs(&[1.0, 0.0, -2.0, std::f64::consts::E]);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0], (0, 0.0));
        assert_eq!(logs[1].0, 3);
        assert!((logs[1].1 - 1.0).abs() < 1e-12);
    }
}

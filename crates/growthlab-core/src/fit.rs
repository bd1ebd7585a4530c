//! Exponential growth-model fitting
//!
//! Fits `y = a * exp(r * day)` by ordinary least squares of `ln(y)` on
//! `day`, using the closed-form slope and intercept:
//!
//! ```text
//! r = (n Σxy - Σx Σy) / (n Σxx - (Σx)²)
//! ln(a) = (Σy - r Σx) / n
//! R² = 1 - SS_res / SS_tot        (log space)
//! ```
//!
//! Only strictly positive measurements are usable. The fit is neither
//! weighted nor robust; outliers are handled upstream by the detector.

use serde::{Deserialize, Serialize};

use crate::error::FitError;
use crate::types::Subject;

/// Usable points required for a fit
pub const MIN_FIT_POINTS: usize = 3;

/// Fitted exponential model `a * exp(r * day)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Record))]
#[serde(rename_all = "camelCase")]
pub struct GrowthModel {
    /// Value at day 0, always positive
    pub a: f64,
    /// Growth rate per day, negative for shrinking series
    pub r: f64,
    /// Coefficient of determination in log space, at most 1
    pub r2: f64,
    /// Points that entered the regression
    pub n_points: u32,
    /// Days needed to double, only set for growing series
    pub doubling_time: Option<f64>,
}

impl GrowthModel {
    /// Model with R² still unset
    fn new(a: f64, r: f64, n_points: u32) -> Self {
        Self {
            a,
            r,
            r2: f64::NAN,
            n_points,
            doubling_time: (r > 0.0).then(|| std::f64::consts::LN_2 / r),
        }
    }

    /// Model value on `day`
    pub fn predict(&self, day: f64) -> f64 {
        self.a * (self.r * day).exp()
    }
}

/// Fit outcome as reported per subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ModelOutcome {
    Fitted(GrowthModel),
    Failed { error: FitError },
}

impl ModelOutcome {
    pub fn model(&self) -> Option<&GrowthModel> {
        match self {
            Self::Fitted(model) => Some(model),
            Self::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&FitError> {
        match self {
            Self::Fitted(_) => None,
            Self::Failed { error } => Some(error),
        }
    }
}

impl From<Result<GrowthModel, FitError>> for ModelOutcome {
    fn from(result: Result<GrowthModel, FitError>) -> Self {
        match result {
            Ok(model) => Self::Fitted(model),
            Err(error) => Self::Failed { error },
        }
    }
}

/// Fit an exponential model to one series
pub fn fit(time_points: &[f64], measurements: &[f64]) -> Result<GrowthModel, FitError> {
    if time_points.len() != measurements.len() {
        return Err(FitError::LengthMismatch {
            time_points: time_points.len(),
            measurements: measurements.len(),
        });
    }

    let (xs, ys): (Vec<f64>, Vec<f64>) = time_points
        .iter()
        .zip(measurements)
        .filter(|(x, y)| x.is_finite() && y.is_finite() && **y > 0.0)
        .map(|(x, y)| (*x, y.ln()))
        .unzip();

    let n = xs.len();
    if n < MIN_FIT_POINTS {
        return Err(FitError::InsufficientData { usable: n });
    }
    if ys.iter().all(|y| *y == ys[0]) {
        return Err(FitError::ZeroVariance);
    }

    let nf = n as f64;
    let sum_x: f64 = xs.iter().sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = xs.iter().zip(&ys).map(|(x, y)| x * y).sum();
    let sum_xx: f64 = xs.iter().map(|x| x * x).sum();

    let denom = nf * sum_xx - sum_x * sum_x;
    if denom.abs() <= f64::EPSILON * nf * sum_xx.max(1.0) {
        return Err(FitError::DegenerateTime);
    }

    let slope = (nf * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / nf;
    let mut model = GrowthModel::new(intercept.exp(), slope, n as u32);

    let mean_y = sum_y / nf;
    let ss_tot: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
    if ss_tot == 0.0 {
        return Err(FitError::ZeroVariance);
    }
    let ss_res: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| (y - model.predict(*x).ln()).powi(2))
        .sum();
    model.r2 = 1.0 - ss_res / ss_tot;

    if !(model.a.is_finite() && model.r.is_finite() && model.r2.is_finite()) || model.a <= 0.0 {
        return Err(FitError::NonFinite);
    }
    Ok(model)
}

/// Fit a subject's full series
pub fn fit_subject(subject: &Subject) -> Result<GrowthModel, FitError> {
    fit(&subject.time_points, &subject.measurements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noiseless_exponential_recovered() {
        let days = [0.0f64, 5.0, 10.0, 15.0];
        let values: Vec<f64> = days.iter().map(|d| 10.0 * (0.1 * d).exp()).collect();
        let model = fit(&days, &values).unwrap();

        assert!((model.r2 - 1.0).abs() < 1e-9);
        assert!((model.a - 10.0).abs() < 1e-6);
        assert!((model.r - 0.1).abs() < 1e-6);
        assert_eq!(model.n_points, 4);
    }

    #[test]
    fn test_noisy_series_r2_below_one() {
        let model = fit(&[0.0, 3.0, 6.0, 9.0], &[100.0, 50.0, 200.0, 210.0]).unwrap();
        assert!(model.r2 < 1.0);
        assert!(model.r > 0.0);
    }

    #[test]
    fn test_shrinking_series_negative_rate() {
        let days = [0.0f64, 2.0, 4.0];
        let values: Vec<f64> = days.iter().map(|d| 50.0 * (-0.2 * d).exp()).collect();
        let model = fit(&days, &values).unwrap();
        assert!((model.r + 0.2).abs() < 1e-9);
        assert!(model.doubling_time.is_none());
    }

    #[test]
    fn test_insufficient_points() {
        let err = fit(&[0.0, 5.0], &[10.0, 20.0]).unwrap_err();
        assert_eq!(err, FitError::InsufficientData { usable: 2 });
        assert_eq!(err.to_string(), "Insufficient data points");
    }

    #[test]
    fn test_non_positive_points_not_usable() {
        let err = fit(&[0.0, 5.0, 10.0, 15.0], &[10.0, 0.0, -3.0, 20.0]).unwrap_err();
        assert_eq!(err, FitError::InsufficientData { usable: 2 });
    }

    #[test]
    fn test_identical_measurements_degenerate() {
        let err = fit(&[0.0, 5.0, 10.0], &[42.0, 42.0, 42.0]).unwrap_err();
        assert_eq!(err, FitError::ZeroVariance);
    }

    #[test]
    fn test_single_day_degenerate() {
        let err = fit(&[4.0, 4.0, 4.0], &[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err, FitError::DegenerateTime);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            fit(&[0.0, 1.0, 2.0], &[1.0, 2.0]),
            Err(FitError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_predict_and_doubling_time() {
        let r = std::f64::consts::LN_2 / 7.0;
        let days = [0.0f64, 7.0, 14.0];
        let values: Vec<f64> = days.iter().map(|d| 10.0 * (r * d).exp()).collect();
        let model = fit(&days, &values).unwrap();

        assert!((model.predict(7.0) - 20.0).abs() < 1e-9);
        assert!((model.predict(21.0) - 80.0).abs() < 1e-8);
        assert!((model.doubling_time.unwrap() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_fitted_model_serializes_doubling_time() {
        let days = [0.0f64, 7.0, 14.0];
        let values: Vec<f64> = days.iter().map(|d| 5.0 * (0.1 * d).exp()).collect();
        let outcome: ModelOutcome = fit(&days, &values).into();
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["status"], "fitted");
        assert_eq!(json["nPoints"], 3);
        let doubling = json["doublingTime"].as_f64().unwrap();
        assert!((doubling - std::f64::consts::LN_2 / 0.1).abs() < 1e-6);

        let shrinking: ModelOutcome = fit(&days, &[30.0, 20.0, 10.0]).into();
        assert!(serde_json::to_value(&shrinking).unwrap()["doublingTime"].is_null());
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome: ModelOutcome = fit(&[0.0], &[1.0]).into();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["kind"], "insufficientData");
        assert!(outcome.model().is_none());
    }
}

//! Core data types: subjects, flags and severities

use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Longitudinal measurement series for one subject
///
/// `time_points` are day numbers, strictly increasing with possible gaps;
/// `measurements` has the same length. Non-positive measurements are
/// accepted as raw input and excluded from log-domain math downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub group: String,
    pub time_points: Vec<f64>,
    pub measurements: Vec<f64>,
}

impl Subject {
    pub fn new(
        id: impl Into<String>,
        group: impl Into<String>,
        time_points: Vec<f64>,
        measurements: Vec<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            group: group.into(),
            time_points,
            measurements,
        }
    }

    /// Check the structural invariants of the series
    pub fn validate(&self) -> Result<(), DataError> {
        if self.time_points.len() != self.measurements.len() {
            return Err(DataError::LengthMismatch {
                subject_id: self.id.clone(),
                time_points: self.time_points.len(),
                measurements: self.measurements.len(),
            });
        }
        for (index, (day, value)) in self.points().enumerate() {
            if !day.is_finite() || !value.is_finite() {
                return Err(DataError::NonFinite {
                    subject_id: self.id.clone(),
                    index,
                });
            }
            if index > 0 && day <= self.time_points[index - 1] {
                return Err(DataError::NonIncreasingDays {
                    subject_id: self.id.clone(),
                    index,
                });
            }
        }
        Ok(())
    }

    /// Number of (day, value) points
    pub fn len(&self) -> usize {
        self.time_points.len().min(self.measurements.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over (day, value) pairs
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.time_points
            .iter()
            .copied()
            .zip(self.measurements.iter().copied())
    }

    /// Index of the point recorded on `day`
    pub fn index_of_day(&self, day: f64) -> Option<usize> {
        self.time_points.iter().position(|&d| d == day)
    }

    /// Measurement recorded on `day`
    pub fn value_at(&self, day: f64) -> Option<f64> {
        self.index_of_day(day).and_then(|i| self.measurements.get(i).copied())
    }
}

/// A single (day, value) measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub day: f64,
    pub value: f64,
}

/// Sorted distinct days observed across `subjects`
pub fn distinct_days<'a>(subjects: impl IntoIterator<Item = &'a Subject>) -> Vec<f64> {
    let mut days: Vec<f64> = subjects
        .into_iter()
        .flat_map(|s| s.time_points.iter().copied())
        .filter(|d| d.is_finite())
        .collect();
    days.sort_by(f64::total_cmp);
    days.dedup();
    days
}

/// Subjects grouped by `group`, groups in order of first appearance
pub fn group_subjects(subjects: &[Subject]) -> Vec<(String, Vec<&Subject>)> {
    let mut groups: Vec<(String, Vec<&Subject>)> = Vec::new();
    for subject in subjects {
        match groups.iter_mut().find(|(name, _)| *name == subject.group) {
            Some((_, members)) => members.push(subject),
            None => groups.push((subject.group.clone(), vec![subject])),
        }
    }
    groups
}

/// Kind of anomaly attached to a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
pub enum FlagType {
    /// Measurement is zero or negative
    ImpossibleValue,
    /// Growth rate from the previous point exceeds the configured maximum
    ExtremeGrowth,
    /// Decline rate from the previous point exceeds the configured maximum
    ExtremeDecline,
    /// Final measurement fell below half of the one before it
    LastDayDrop,
    /// Outside the subject's own log-value IQR fences
    IntraOutlier,
    /// Outside the group's log-value IQR fences on that day
    GroupOutlier,
}

impl FlagType {
    pub const ALL: [FlagType; 6] = [
        Self::ImpossibleValue,
        Self::ExtremeGrowth,
        Self::ExtremeDecline,
        Self::LastDayDrop,
        Self::IntraOutlier,
        Self::GroupOutlier,
    ];

    /// Static severity of this flag type
    pub fn severity(&self) -> Severity {
        match self {
            Self::ImpossibleValue => Severity::Critical,
            Self::ExtremeGrowth => Severity::High,
            Self::ExtremeDecline => Severity::High,
            Self::LastDayDrop => Severity::Medium,
            Self::IntraOutlier => Severity::Medium,
            Self::GroupOutlier => Severity::Low,
        }
    }

    /// Wire name (`IMPOSSIBLE_VALUE`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImpossibleValue => "IMPOSSIBLE_VALUE",
            Self::ExtremeGrowth => "EXTREME_GROWTH",
            Self::ExtremeDecline => "EXTREME_DECLINE",
            Self::LastDayDrop => "LAST_DAY_DROP",
            Self::IntraOutlier => "INTRA_OUTLIER",
            Self::GroupOutlier => "GROUP_OUTLIER",
        }
    }
}

impl std::fmt::Display for FlagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity class of a flag, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An anomaly attached to one measurement of one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    pub subject_id: String,
    pub group: String,
    pub day: f64,
    pub value: f64,
    pub severity: Severity,
}

impl Flag {
    /// Create a flag; severity comes from the flag type
    pub fn new(flag_type: FlagType, subject: &Subject, day: f64, value: f64) -> Self {
        Self {
            flag_type,
            subject_id: subject.id.clone(),
            group: subject.group.clone(),
            day,
            value,
            severity: flag_type.severity(),
        }
    }

    /// Whether the flag sits on the baseline day
    pub fn is_day_zero(&self) -> bool {
        self.day == 0.0
    }
}

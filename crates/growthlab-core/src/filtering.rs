//! Filtering decisions and the two filtered dataset views
//!
//! Each flag receives an INCLUDE/EXCLUDE decision from its severity and the
//! chosen [`FilteringLevel`]; flags on day 0 are always included. The same
//! decision set then drives two alternative views:
//!
//! - **Subject-level** ([`dual_analysis`]): any subject owning an excluded
//!   flag is removed entirely.
//! - **Point-level** ([`point_filter`]): only the excluded (day, value)
//!   points are removed; subjects left with fewer than
//!   [`MIN_POINTS_AFTER_FILTER`] points are dropped.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{DataPoint, Flag, Severity, Subject};

/// A point-filtered subject needs at least this many points to be kept
pub const MIN_POINTS_AFTER_FILTER: usize = 3;

/// How aggressively flagged measurements are excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
pub enum FilteringLevel {
    /// Exclude critical flags only
    Critical,
    /// Exclude critical and high flags
    CriticalAndHigh,
    /// Exclude every flag
    All,
}

impl FilteringLevel {
    pub const ALL: [FilteringLevel; 3] = [Self::Critical, Self::CriticalAndHigh, Self::All];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::CriticalAndHigh => "criticalAndHigh",
            Self::All => "all",
        }
    }

    /// Whether flags of `severity` are excluded at this level
    pub fn excludes(&self, severity: Severity) -> bool {
        match self {
            Self::Critical => severity == Severity::Critical,
            Self::CriticalAndHigh => matches!(severity, Severity::Critical | Severity::High),
            Self::All => true,
        }
    }
}

impl FromStr for FilteringLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|l| l.name() == s.trim())
            .ok_or_else(|| ConfigError::UnknownFilteringLevel(s.to_string()))
    }
}

impl std::fmt::Display for FilteringLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome for a single flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    Include,
    Exclude,
}

/// Why a decision came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DecisionReason {
    /// Baseline measurements are never excluded
    DayZeroPreserved,
    /// Severity is covered by the filtering level
    SeverityExcluded {
        severity: Severity,
        level: FilteringLevel,
    },
    /// Severity is below the filtering level
    SeverityRetained {
        severity: Severity,
        level: FilteringLevel,
    },
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DayZeroPreserved => f.write_str("Day 0 always preserved"),
            Self::SeverityExcluded { severity, level } => {
                write!(f, "{severity} severity excluded at level {level}")
            }
            Self::SeverityRetained { severity, level } => {
                write!(f, "{severity} severity retained at level {level}")
            }
        }
    }
}

/// Decision attached to one flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub flag: Flag,
    pub decision: DecisionKind,
    pub reason: DecisionReason,
    /// Made by the rule engine rather than a reviewer
    pub automatic: bool,
}

impl Decision {
    pub fn is_excluded(&self) -> bool {
        self.decision == DecisionKind::Exclude
    }
}

/// Decide every flag at `level`
pub fn decide(flags: &[Flag], level: FilteringLevel) -> Vec<Decision> {
    flags.iter().map(|flag| decide_flag(flag, level)).collect()
}

/// Decide a single flag at `level`
pub fn decide_flag(flag: &Flag, level: FilteringLevel) -> Decision {
    let (decision, reason) = if flag.is_day_zero() {
        (DecisionKind::Include, DecisionReason::DayZeroPreserved)
    } else if level.excludes(flag.severity) {
        (
            DecisionKind::Exclude,
            DecisionReason::SeverityExcluded {
                severity: flag.severity,
                level,
            },
        )
    } else {
        (
            DecisionKind::Include,
            DecisionReason::SeverityRetained {
                severity: flag.severity,
                level,
            },
        )
    };

    Decision {
        flag: flag.clone(),
        decision,
        reason,
        automatic: true,
    }
}

/// Excluded days per subject id
fn excluded_days(decisions: &[Decision]) -> HashMap<&str, Vec<f64>> {
    let mut days: HashMap<&str, Vec<f64>> = HashMap::new();
    for d in decisions.iter().filter(|d| d.is_excluded() && !d.flag.is_day_zero()) {
        days.entry(d.flag.subject_id.as_str()).or_default().push(d.flag.day);
    }
    days
}

/// One side of the dual analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetView {
    pub subjects: Vec<Subject>,
    pub count: usize,
    pub total_measurements: usize,
}

impl DatasetView {
    pub fn new(subjects: Vec<Subject>) -> Self {
        let count = subjects.len();
        let total_measurements = subjects.iter().map(Subject::len).sum();
        Self {
            subjects,
            count,
            total_measurements,
        }
    }
}

/// What subject-level filtering removed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringImpact {
    pub subjects_excluded: usize,
    pub measurements_excluded: usize,
    pub excluded_subject_ids: Vec<String>,
}

/// Complete dataset next to the subject-level filtered dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DualAnalysisResult {
    pub complete: DatasetView,
    pub filtered: DatasetView,
    pub impact: FilteringImpact,
}

/// Remove every subject that owns at least one excluded flag
pub fn dual_analysis(subjects: &[Subject], decisions: &[Decision]) -> DualAnalysisResult {
    let excluded: HashSet<&str> = excluded_days(decisions).into_keys().collect();

    let (removed, kept): (Vec<&Subject>, Vec<&Subject>) = subjects
        .iter()
        .partition(|s| excluded.contains(s.id.as_str()));

    let complete = DatasetView::new(subjects.to_vec());
    let filtered = DatasetView::new(kept.into_iter().cloned().collect());

    let impact = FilteringImpact {
        subjects_excluded: complete.count - filtered.count,
        measurements_excluded: complete.total_measurements - filtered.total_measurements,
        excluded_subject_ids: removed.iter().map(|s| s.id.clone()).collect(),
    };

    tracing::debug!(
        "Subject-level filtering kept {}/{} subjects",
        filtered.count,
        complete.count
    );

    DualAnalysisResult {
        complete,
        filtered,
        impact,
    }
}

/// A subject with its excluded points removed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointFilteredSubject {
    pub subject: Subject,
    pub excluded_points: Vec<DataPoint>,
}

/// Dataset with only the offending points removed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointFilteredResult {
    /// Subjects that kept at least [`MIN_POINTS_AFTER_FILTER`] points
    pub subjects: Vec<PointFilteredSubject>,
    /// Subjects dropped for having too few points left
    pub dropped_subject_ids: Vec<String>,
    /// Points removed across all subjects, dropped ones included
    pub points_excluded: usize,
}

impl PointFilteredResult {
    /// The filtered series without the exclusion bookkeeping
    pub fn filtered_subjects(&self) -> Vec<Subject> {
        self.subjects.iter().map(|s| s.subject.clone()).collect()
    }
}

/// Remove excluded (day, value) points; day 0 is never removed
pub fn point_filter(subjects: &[Subject], decisions: &[Decision]) -> PointFilteredResult {
    let excluded = excluded_days(decisions);
    let mut kept = Vec::with_capacity(subjects.len());
    let mut dropped_subject_ids = Vec::new();
    let mut points_excluded = 0;

    for subject in subjects {
        let days = excluded.get(subject.id.as_str());
        let mut time_points = Vec::with_capacity(subject.len());
        let mut measurements = Vec::with_capacity(subject.len());
        let mut excluded_points = Vec::new();

        for (day, value) in subject.points() {
            let remove = day != 0.0 && days.is_some_and(|ds| ds.contains(&day));
            if remove {
                excluded_points.push(DataPoint { day, value });
            } else {
                time_points.push(day);
                measurements.push(value);
            }
        }

        points_excluded += excluded_points.len();
        if time_points.len() < MIN_POINTS_AFTER_FILTER {
            dropped_subject_ids.push(subject.id.clone());
            continue;
        }

        kept.push(PointFilteredSubject {
            subject: Subject {
                id: subject.id.clone(),
                group: subject.group.clone(),
                time_points,
                measurements,
            },
            excluded_points,
        });
    }

    tracing::debug!(
        "Point-level filtering removed {} points, dropped {} subjects",
        points_excluded,
        dropped_subject_ids.len()
    );

    PointFilteredResult {
        subjects: kept,
        dropped_subject_ids,
        points_excluded,
    }
}

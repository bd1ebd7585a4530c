//! Outlier detection over subject series
//!
//! Three independent passes produce [`Flag`]s:
//!
//! 1. **Sequential** (per subject): impossible values, extreme growth or
//!    decline between consecutive points, and a last-day drop below half of
//!    the previous value.
//! 2. **Intra-subject** (per subject, at least [`MIN_INTRA_POINTS`] positive
//!    values): log values outside the subject's own IQR fences.
//! 3. **Cross-subject** (per group): on each day with at least
//!    [`MIN_DAY_CONTRIBUTORS`] positive values, log values outside the
//!    group's IQR fences for that day.
//!
//! Flags are not de-duplicated; one point may carry several. Day 0 is never
//! flagged by the IQR passes. Every pass is a pure function of its input, so
//! the passes can be split across workers (see [`crate::parallel`]).

use std::collections::{BTreeMap, HashMap};

use growthlab_stats::{iqr_bounds, log_growth_rate, positive_logs};
use serde::{Deserialize, Serialize};

use crate::config::OutlierConfig;
use crate::types::{distinct_days, group_subjects, Flag, FlagType, Subject};

/// Positive measurements a subject needs for the intra-subject pass
pub const MIN_INTRA_POINTS: usize = 4;

/// Positive measurements a day needs for the cross-subject pass
pub const MIN_DAY_CONTRIBUTORS: usize = 3;

/// Final value below this fraction of the previous one is a last-day drop
pub const LAST_DAY_DROP_RATIO: f64 = 0.5;

/// A flagged measurement with every flag type it carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedPoint {
    pub index: usize,
    pub day: f64,
    pub value: f64,
    pub flag_types: Vec<FlagType>,
}

/// Flagged measurements of one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAnnotation {
    pub subject_id: String,
    pub group: String,
    pub flagged_points: Vec<FlaggedPoint>,
}

/// Output of a detection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlierReport {
    pub flags: Vec<Flag>,
    /// One entry per subject with at least one flag, in input order
    pub annotations: Vec<SubjectAnnotation>,
}

/// Synchronous outlier detector
#[derive(Debug, Clone, Default)]
pub struct OutlierDetector {
    config: OutlierConfig,
}

impl OutlierDetector {
    pub fn new(config: OutlierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OutlierConfig {
        &self.config
    }

    /// Run all passes over `subjects`
    ///
    /// Flag order: for each subject in input order its sequential then
    /// intra-subject flags, followed by group flags for each group in order
    /// of first appearance.
    pub fn analyze(&self, subjects: &[Subject]) -> OutlierReport {
        let mut flags: Vec<Flag> = subjects
            .iter()
            .flat_map(|s| subject_flags(s, &self.config))
            .collect();

        for (group, members) in group_subjects(subjects) {
            flags.extend(group_flags(&group, &members, &self.config));
        }

        tracing::info!(
            "Outlier detection flagged {} measurements across {} subjects",
            flags.len(),
            subjects.len()
        );

        let annotations = annotate(subjects, &flags);
        OutlierReport { flags, annotations }
    }
}

/// Sequential and intra-subject flags for one subject
pub fn subject_flags(subject: &Subject, config: &OutlierConfig) -> Vec<Flag> {
    let mut flags = sequential_flags(subject, config);
    flags.extend(intra_subject_flags(subject, config));
    flags
}

/// Impossible values, extreme growth/decline and last-day drops
pub fn sequential_flags(subject: &Subject, config: &OutlierConfig) -> Vec<Flag> {
    let mut flags = Vec::new();
    let n = subject.len();

    for i in 0..n {
        let day = subject.time_points[i];
        let value = subject.measurements[i];

        if value <= 0.0 {
            flags.push(Flag::new(FlagType::ImpossibleValue, subject, day, value));
        }

        if i == 0 {
            continue;
        }
        let prev_day = subject.time_points[i - 1];
        let prev = subject.measurements[i - 1];

        if let Some(r) = log_growth_rate(prev_day, prev, day, value) {
            if value > prev && r.abs() > config.max_growth_rate {
                flags.push(Flag::new(FlagType::ExtremeGrowth, subject, day, value));
            } else if value < prev && r.abs() > config.max_decline_rate {
                flags.push(Flag::new(FlagType::ExtremeDecline, subject, day, value));
            }
        }

        if i == n - 1 && value < prev * LAST_DAY_DROP_RATIO {
            flags.push(Flag::new(FlagType::LastDayDrop, subject, day, value));
        }
    }

    flags
}

/// Log values outside the subject's own IQR fences
pub fn intra_subject_flags(subject: &Subject, config: &OutlierConfig) -> Vec<Flag> {
    let logs = positive_logs(&subject.measurements[..subject.len()]);
    if logs.len() < MIN_INTRA_POINTS {
        tracing::debug!(
            "Skipping intra-subject pass for {}: {} positive values",
            subject.id,
            logs.len()
        );
        return Vec::new();
    }

    let values: Vec<f64> = logs.iter().map(|(_, l)| *l).collect();
    let Some(bounds) = iqr_bounds(&values, config.iqr_sensitivity) else {
        return Vec::new();
    };

    logs.iter()
        .filter(|(i, l)| subject.time_points[*i] != 0.0 && bounds.is_outlier(*l))
        .map(|(i, _)| {
            Flag::new(
                FlagType::IntraOutlier,
                subject,
                subject.time_points[*i],
                subject.measurements[*i],
            )
        })
        .collect()
}

/// Log values outside the group's per-day IQR fences
///
/// Skipped entirely when the group has fewer than
/// `config.min_group_size_for_iqr` subjects.
pub fn group_flags(group: &str, members: &[&Subject], config: &OutlierConfig) -> Vec<Flag> {
    if members.len() < config.min_group_size_for_iqr as usize {
        tracing::debug!(
            "Skipping group pass for {}: {} subjects",
            group,
            members.len()
        );
        return Vec::new();
    }

    let mut flags = Vec::new();
    for day in distinct_days(members.iter().copied()) {
        if day == 0.0 {
            continue;
        }

        let contributions: Vec<(&Subject, f64)> = members
            .iter()
            .filter_map(|s| s.value_at(day).map(|v| (*s, v)))
            .filter(|(_, v)| *v > 0.0 && v.is_finite())
            .collect();
        if contributions.len() < MIN_DAY_CONTRIBUTORS {
            continue;
        }

        let logs: Vec<f64> = contributions.iter().map(|(_, v)| v.ln()).collect();
        let Some(bounds) = iqr_bounds(&logs, config.iqr_sensitivity) else {
            continue;
        };

        for ((subject, value), log) in contributions.iter().zip(&logs) {
            if bounds.is_outlier(*log) {
                flags.push(Flag::new(FlagType::GroupOutlier, subject, day, *value));
            }
        }
    }
    flags
}

/// Group flags by subject and measurement index
pub fn annotate(subjects: &[Subject], flags: &[Flag]) -> Vec<SubjectAnnotation> {
    let mut by_subject: HashMap<&str, BTreeMap<usize, FlaggedPoint>> = HashMap::new();
    let lookup: HashMap<&str, &Subject> = subjects.iter().map(|s| (s.id.as_str(), s)).collect();

    for flag in flags {
        let Some(&subject) = lookup.get(flag.subject_id.as_str()) else {
            continue;
        };
        let Some(index) = subject.index_of_day(flag.day) else {
            continue;
        };
        by_subject
            .entry(subject.id.as_str())
            .or_default()
            .entry(index)
            .or_insert_with(|| FlaggedPoint {
                index,
                day: flag.day,
                value: flag.value,
                flag_types: Vec::new(),
            })
            .flag_types
            .push(flag.flag_type);
    }

    subjects
        .iter()
        .filter_map(|s| {
            let points = by_subject.remove(s.id.as_str())?;
            Some(SubjectAnnotation {
                subject_id: s.id.clone(),
                group: s.group.clone(),
                flagged_points: points.into_values().collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutlierPreset;

    fn subject(id: &str, group: &str, days: &[f64], values: &[f64]) -> Subject {
        Subject::new(id, group, days.to_vec(), values.to_vec())
    }

    fn types(flags: &[Flag]) -> Vec<(FlagType, f64)> {
        flags.iter().map(|f| (f.flag_type, f.day)).collect()
    }

    fn lenient() -> OutlierConfig {
        OutlierConfig {
            max_growth_rate: 10.0,
            max_decline_rate: 10.0,
            iqr_sensitivity: 1.5,
            min_group_size_for_iqr: 3,
        }
    }

    #[test]
    fn test_extreme_decline_at_day_three() {
        let s = subject("m1", "g", &[0.0, 3.0, 6.0, 9.0], &[100.0, 50.0, 200.0, 210.0]);
        let config = OutlierConfig {
            max_decline_rate: 0.1,
            ..lenient()
        };
        let flags = sequential_flags(&s, &config);

        assert_eq!(types(&flags), vec![(FlagType::ExtremeDecline, 3.0)]);
        assert!(flags.iter().all(|f| f.day != 0.0));
    }

    #[test]
    fn test_extreme_growth() {
        let s = subject("m1", "g", &[0.0, 3.0, 6.0], &[100.0, 110.0, 1000.0]);
        let config = OutlierConfig {
            max_growth_rate: 0.5,
            ..lenient()
        };
        let flags = sequential_flags(&s, &config);
        // ln(1000/110)/3 ≈ 0.736
        assert_eq!(types(&flags), vec![(FlagType::ExtremeGrowth, 6.0)]);
    }

    #[test]
    fn test_zero_value_is_impossible_and_skips_rates() {
        let s = subject("m1", "g", &[0.0, 3.0, 6.0, 9.0], &[100.0, 0.0, 120.0, 130.0]);
        let config = OutlierConfig {
            max_growth_rate: 0.001,
            max_decline_rate: 0.001,
            ..lenient()
        };
        let flags = sequential_flags(&s, &config);

        // No rate involving the zero, only 120 -> 130 is rated
        assert_eq!(
            types(&flags),
            vec![
                (FlagType::ImpossibleValue, 3.0),
                (FlagType::ExtremeGrowth, 9.0)
            ]
        );
    }

    #[test]
    fn test_last_day_drop() {
        let s = subject("m1", "g", &[0.0, 7.0, 14.0], &[100.0, 120.0, 50.0]);
        let flags = sequential_flags(&s, &lenient());
        assert_eq!(types(&flags), vec![(FlagType::LastDayDrop, 14.0)]);
    }

    #[test]
    fn test_last_day_drop_and_decline_coexist() {
        let s = subject("m1", "g", &[0.0, 7.0, 8.0], &[100.0, 120.0, 10.0]);
        let config = OutlierConfig {
            max_decline_rate: 0.5,
            ..lenient()
        };
        let flags = sequential_flags(&s, &config);
        assert_eq!(
            types(&flags),
            vec![(FlagType::ExtremeDecline, 8.0), (FlagType::LastDayDrop, 8.0)]
        );
    }

    #[test]
    fn test_intra_outlier() {
        let s = subject(
            "m1",
            "g",
            &[0.0, 2.0, 4.0, 6.0, 8.0, 10.0],
            &[100.0, 105.0, 110.0, 115.0, 120.0, 5000.0],
        );
        let flags = intra_subject_flags(&s, &lenient());
        assert_eq!(types(&flags), vec![(FlagType::IntraOutlier, 10.0)]);
    }

    #[test]
    fn test_intra_skips_day_zero() {
        let s = subject(
            "m1",
            "g",
            &[0.0, 2.0, 4.0, 6.0, 8.0],
            &[1.0, 100.0, 105.0, 110.0, 115.0],
        );
        assert!(intra_subject_flags(&s, &lenient()).is_empty());
    }

    #[test]
    fn test_intra_requires_four_positive_values() {
        let s = subject(
            "m1",
            "g",
            &[0.0, 2.0, 4.0, 6.0],
            &[100.0, 0.0, 110.0, 5000.0],
        );
        assert!(intra_subject_flags(&s, &lenient()).is_empty());
    }

    #[test]
    fn test_group_outlier_single_flag() {
        let subjects = vec![
            subject("a", "g", &[0.0, 10.0], &[50.0, 100.0]),
            subject("b", "g", &[0.0, 10.0], &[50.0, 105.0]),
            subject("c", "g", &[0.0, 10.0], &[50.0, 5000.0]),
        ];
        let members: Vec<&Subject> = subjects.iter().collect();
        let config = OutlierConfig {
            iqr_sensitivity: 0.5,
            ..lenient()
        };
        let flags = group_flags("g", &members, &config);

        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].flag_type, FlagType::GroupOutlier);
        assert_eq!(flags[0].subject_id, "c");
        assert_eq!(flags[0].day, 10.0);
        assert_eq!(flags[0].value, 5000.0);
    }

    #[test]
    fn test_group_pass_respects_min_group_size() {
        let subjects = vec![
            subject("a", "g", &[0.0, 10.0], &[50.0, 100.0]),
            subject("b", "g", &[0.0, 10.0], &[50.0, 105.0]),
            subject("c", "g", &[0.0, 10.0], &[50.0, 5000.0]),
        ];
        let members: Vec<&Subject> = subjects.iter().collect();
        let config = OutlierConfig {
            iqr_sensitivity: 0.5,
            min_group_size_for_iqr: 4,
            ..lenient()
        };
        assert!(group_flags("g", &members, &config).is_empty());
    }

    #[test]
    fn test_group_pass_skips_sparse_days() {
        let subjects = vec![
            subject("a", "g", &[0.0, 10.0], &[50.0, 100.0]),
            subject("b", "g", &[0.0, 10.0], &[50.0, 0.0]),
            subject("c", "g", &[0.0, 10.0], &[50.0, 5000.0]),
        ];
        let members: Vec<&Subject> = subjects.iter().collect();
        let config = OutlierConfig {
            iqr_sensitivity: 0.0,
            ..lenient()
        };
        // Only two positive values on day 10
        assert!(group_flags("g", &members, &config).is_empty());
    }

    #[test]
    fn test_analyze_builds_annotations() {
        let subjects = vec![
            subject("a", "g", &[0.0, 3.0, 6.0], &[100.0, 0.0, 120.0]),
            subject("b", "g", &[0.0, 3.0, 6.0], &[100.0, 110.0, 120.0]),
        ];
        let report = OutlierDetector::new(OutlierPreset::Moderate.config()).analyze(&subjects);

        assert_eq!(report.flags.len(), 1);
        assert_eq!(report.annotations.len(), 1);
        let annotation = &report.annotations[0];
        assert_eq!(annotation.subject_id, "a");
        assert_eq!(annotation.flagged_points[0].index, 1);
        assert_eq!(
            annotation.flagged_points[0].flag_types,
            vec![FlagType::ImpossibleValue]
        );
    }

    #[test]
    fn test_annotation_merges_flags_on_same_point() {
        let s = subject("m1", "g", &[0.0, 7.0, 8.0], &[100.0, 120.0, 10.0]);
        let config = OutlierConfig {
            max_decline_rate: 0.5,
            ..lenient()
        };
        let report = OutlierDetector::new(config).analyze(std::slice::from_ref(&s));
        let points = &report.annotations[0].flagged_points;
        assert_eq!(points.len(), 1);
        assert_eq!(
            points[0].flag_types,
            vec![FlagType::ExtremeDecline, FlagType::LastDayDrop]
        );
    }
}

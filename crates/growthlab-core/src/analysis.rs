//! End-to-end analysis pipeline
//!
//! `validate → detect → decide → dual + point views → model view → fit →
//! group matrices → comparisons`. Each stage returns a new value; subjects
//! are never mutated.

use std::collections::{BTreeMap, HashSet};

use growthlab_stats::{compare, ComparisonResult};
use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfig, ModelView};
use crate::error::{DataError, Result};
use crate::filtering::{
    decide, dual_analysis, point_filter, Decision, DecisionKind, DualAnalysisResult,
    PointFilteredResult,
};
use crate::fit::{fit_subject, ModelOutcome};
use crate::matrix::TgrMatrix;
use crate::outlier::SubjectAnnotation;
use crate::parallel::{BatchFailure, InProcessWorker, Supervisor, Worker};
use crate::types::{Flag, FlagType, Severity, Subject};

/// What a comparison is computed over
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ComparisonScope {
    /// Per-subject TGR values of one matrix cell
    DayPair { from: f64, to: f64 },
    /// Fitted growth rates `r` of the modelled subjects
    FittedRate,
}

/// Comparison of two groups, `group_a < group_b`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabeledComparison {
    pub group_a: String,
    pub group_b: String,
    pub scope: ComparisonScope,
    pub result: ComparisonResult,
}

/// Counts over flags and decisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub total_flags: usize,
    /// Every flag type is present, zero when unused
    pub flag_counts: BTreeMap<FlagType, usize>,
    pub severity_counts: BTreeMap<Severity, usize>,
    pub decision_counts: BTreeMap<DecisionKind, usize>,
}

impl AnalysisSummary {
    pub fn new(flags: &[Flag], decisions: &[Decision]) -> Self {
        let mut flag_counts: BTreeMap<FlagType, usize> =
            FlagType::ALL.iter().map(|t| (*t, 0)).collect();
        let mut severity_counts: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        let mut decision_counts: BTreeMap<DecisionKind, usize> =
            [(DecisionKind::Include, 0), (DecisionKind::Exclude, 0)].into();

        for flag in flags {
            *flag_counts.entry(flag.flag_type).or_default() += 1;
            *severity_counts.entry(flag.severity).or_default() += 1;
        }
        for decision in decisions {
            *decision_counts.entry(decision.decision).or_default() += 1;
        }

        Self {
            total_flags: flags.len(),
            flag_counts,
            severity_counts,
            decision_counts,
        }
    }
}

/// Everything a run produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutput {
    pub flags: Vec<Flag>,
    pub annotations: Vec<SubjectAnnotation>,
    pub decisions: Vec<Decision>,
    pub dual_analysis: DualAnalysisResult,
    pub point_filtering_analysis: PointFilteredResult,
    pub summary: AnalysisSummary,
    pub model_view: ModelView,
    /// Fit outcome per subject of the modelling view
    pub per_subject_models: BTreeMap<String, ModelOutcome>,
    pub group_matrices: BTreeMap<String, TgrMatrix>,
    pub comparisons: Vec<LabeledComparison>,
    /// Batches that failed even after in-process recompute
    pub batch_failures: Vec<BatchFailure>,
}

/// Run the full analysis with the in-process worker
pub fn run(subjects: &[Subject], config: &AnalysisConfig) -> Result<AnalysisOutput> {
    run_with_worker(subjects, config, InProcessWorker)
}

/// Run the full analysis, dispatching batches to `worker`
pub fn run_with_worker<W: Worker>(
    subjects: &[Subject],
    config: &AnalysisConfig,
    worker: W,
) -> Result<AnalysisOutput> {
    config.validate()?;
    validate_subjects(subjects)?;

    tracing::info!(
        "Analyzing {} subjects at filtering level {}",
        subjects.len(),
        config.filtering_level
    );

    let supervisor = Supervisor::new(worker, config.parallel);
    let detection = supervisor.run_detection(subjects, &config.detection);
    let mut batch_failures = detection.failures;
    let flags = detection.report.flags;

    let decisions = decide(&flags, config.filtering_level);
    let dual = dual_analysis(subjects, &decisions);
    let points = point_filter(subjects, &decisions);

    let modelled: Vec<Subject> = match config.model_view {
        ModelView::Complete => subjects.to_vec(),
        ModelView::SubjectFiltered => dual.filtered.subjects.clone(),
        ModelView::PointFiltered => points.filtered_subjects(),
    };

    let per_subject_models: BTreeMap<String, ModelOutcome> = modelled
        .iter()
        .map(|s| (s.id.clone(), fit_subject(s).into()))
        .collect();
    let failed_fits = per_subject_models
        .values()
        .filter(|m| m.model().is_none())
        .count();
    if failed_fits > 0 {
        tracing::debug!("{} of {} subjects could not be fitted", failed_fits, modelled.len());
    }

    let matrix_report = supervisor.run_matrices(&modelled, &config.detection);
    batch_failures.extend(matrix_report.failures);
    let group_matrices = matrix_report.matrices;

    let comparisons = compare_groups(
        &modelled,
        &per_subject_models,
        &group_matrices,
        config.comparison.min_samples,
    )?;

    tracing::info!(
        "Analysis complete: {} flags, {} models, {} comparisons",
        flags.len(),
        per_subject_models.len(),
        comparisons.len()
    );

    Ok(AnalysisOutput {
        summary: AnalysisSummary::new(&flags, &decisions),
        flags,
        annotations: detection.report.annotations,
        decisions,
        dual_analysis: dual,
        point_filtering_analysis: points,
        model_view: config.model_view,
        per_subject_models,
        group_matrices,
        comparisons,
        batch_failures,
    })
}

/// Reject malformed series and duplicate ids
pub fn validate_subjects(subjects: &[Subject]) -> std::result::Result<(), DataError> {
    let mut seen = HashSet::with_capacity(subjects.len());
    for subject in subjects {
        subject.validate()?;
        if !seen.insert(subject.id.as_str()) {
            return Err(DataError::DuplicateSubject(subject.id.clone()));
        }
    }
    Ok(())
}

/// Day-pair and fitted-rate comparisons for every pair of groups
pub fn compare_groups(
    modelled: &[Subject],
    models: &BTreeMap<String, ModelOutcome>,
    matrices: &BTreeMap<String, TgrMatrix>,
    min_samples: usize,
) -> Result<Vec<LabeledComparison>> {
    let groups: Vec<&String> = matrices.keys().collect();
    let mut comparisons = Vec::new();

    for (i, group_a) in groups.iter().enumerate() {
        for group_b in &groups[i + 1..] {
            let (ma, mb) = (&matrices[*group_a], &matrices[*group_b]);

            for (from, to) in ma.pairs() {
                let rates_a = ma.individual_rates(from, to);
                let rates_b = mb.individual_rates(from, to);
                if rates_a.len() < min_samples || rates_b.len() < min_samples {
                    continue;
                }
                comparisons.push(LabeledComparison {
                    group_a: group_a.to_string(),
                    group_b: group_b.to_string(),
                    scope: ComparisonScope::DayPair { from, to },
                    result: compare(&rates_a, &rates_b)?,
                });
            }

            let rates_a = fitted_rates(modelled, models, group_a);
            let rates_b = fitted_rates(modelled, models, group_b);
            if rates_a.len() < min_samples || rates_b.len() < min_samples {
                tracing::debug!(
                    "Skipping fitted-rate comparison {} vs {}: {} and {} models",
                    group_a,
                    group_b,
                    rates_a.len(),
                    rates_b.len()
                );
                continue;
            }
            comparisons.push(LabeledComparison {
                group_a: group_a.to_string(),
                group_b: group_b.to_string(),
                scope: ComparisonScope::FittedRate,
                result: compare(&rates_a, &rates_b)?,
            });
        }
    }

    Ok(comparisons)
}

/// Fitted `r` of each successfully modelled subject in `group`, input order
fn fitted_rates(
    modelled: &[Subject],
    models: &BTreeMap<String, ModelOutcome>,
    group: &str,
) -> Vec<f64> {
    modelled
        .iter()
        .filter(|s| s.group == group)
        .filter_map(|s| models.get(&s.id)?.model().map(|m| m.r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GrowthlabError;
    use crate::filtering::FilteringLevel;

    fn subject(id: &str, group: &str, values: &[f64]) -> Subject {
        Subject::new(id, group, vec![0.0, 3.0, 6.0, 9.0], values.to_vec())
    }

    /// Conservative preset with a decline threshold that catches t1
    fn config() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.detection.max_decline_rate = 0.2;
        config
    }

    fn dataset() -> Vec<Subject> {
        vec![
            subject("c1", "control", &[100.0, 130.0, 170.0, 220.0]),
            subject("c2", "control", &[90.0, 120.0, 160.0, 200.0]),
            subject("c3", "control", &[110.0, 140.0, 180.0, 240.0]),
            subject("t1", "treated", &[100.0, 50.0, 200.0, 210.0]),
            subject("t2", "treated", &[100.0, 105.0, 110.0, 115.0]),
            subject("t3", "treated", &[95.0, 100.0, 104.0, 110.0]),
        ]
    }

    #[test]
    fn test_run_produces_consistent_output() {
        let output = run(&dataset(), &config()).unwrap();

        assert_eq!(output.summary.total_flags, output.flags.len());
        assert_eq!(output.decisions.len(), output.flags.len());
        assert_eq!(output.summary.flag_counts.len(), FlagType::ALL.len());
        assert!(output.summary.flag_counts[&FlagType::ExtremeDecline] >= 1);
        assert!(output.batch_failures.is_empty());

        // t1 loses day 3 under CriticalAndHigh
        assert_eq!(output.dual_analysis.impact.excluded_subject_ids, vec!["t1"]);
        assert_eq!(output.point_filtering_analysis.points_excluded, 1);
        assert_eq!(output.per_subject_models.len(), 6);
    }

    #[test]
    fn test_comparisons_cover_day_pairs_and_fitted_rates() {
        let output = run(&dataset(), &config()).unwrap();

        let fitted: Vec<_> = output
            .comparisons
            .iter()
            .filter(|c| c.scope == ComparisonScope::FittedRate)
            .collect();
        assert_eq!(fitted.len(), 1);
        assert_eq!(fitted[0].group_a, "control");
        assert_eq!(fitted[0].group_b, "treated");
        assert_eq!(fitted[0].result.n1, 3);

        assert!(output
            .comparisons
            .iter()
            .any(|c| c.scope == ComparisonScope::DayPair { from: 0.0, to: 9.0 }));
    }

    #[test]
    fn test_subject_filtered_view_drops_flagged_subject() {
        let config = AnalysisConfig {
            model_view: ModelView::SubjectFiltered,
            ..config()
        };
        let output = run(&dataset(), &config).unwrap();
        assert!(!output.per_subject_models.contains_key("t1"));
        assert_eq!(output.group_matrices["treated"].contributors(0.0, 9.0), 2);
    }

    #[test]
    fn test_min_samples_gates_comparisons() {
        let mut config = config();
        config.comparison.min_samples = 10;
        let output = run(&dataset(), &config).unwrap();
        assert!(output.comparisons.is_empty());
    }

    #[test]
    fn test_critical_level_keeps_high_flags() {
        let config = AnalysisConfig {
            filtering_level: FilteringLevel::Critical,
            ..config()
        };
        let output = run(&dataset(), &config).unwrap();
        assert_eq!(output.summary.decision_counts[&DecisionKind::Exclude], 0);
        assert!(output.dual_analysis.impact.excluded_subject_ids.is_empty());
    }

    #[test]
    fn test_duplicate_subject_rejected() {
        let mut subjects = dataset();
        subjects.push(subject("c1", "treated", &[1.0, 2.0, 3.0, 4.0]));
        let err = run(&subjects, &config()).unwrap_err();
        assert!(matches!(
            err,
            GrowthlabError::Data(DataError::DuplicateSubject(ref id)) if id == "c1"
        ));
    }

    #[test]
    fn test_malformed_subject_rejected() {
        let subjects = vec![Subject::new("x", "g", vec![0.0, 1.0], vec![1.0])];
        assert!(matches!(
            run(&subjects, &config()),
            Err(GrowthlabError::Data(DataError::LengthMismatch { .. }))
        ));
    }

    #[test]
    fn test_empty_input() {
        let output = run(&[], &config()).unwrap();
        assert_eq!(output.summary.total_flags, 0);
        assert!(output.group_matrices.is_empty());
        assert!(output.comparisons.is_empty());
    }

    #[test]
    fn test_output_serializes_camel_case() {
        let output = run(&dataset(), &config()).unwrap();
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["summary"]["flagCounts"]["GROUP_OUTLIER"], 0);
        assert!(json["perSubjectModels"]["c1"]["r"].as_f64().unwrap() > 0.0);
        assert_eq!(json["modelView"], "pointFiltered");
    }
}

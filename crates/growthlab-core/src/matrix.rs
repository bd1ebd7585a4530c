//! Pairwise tumor growth rate (TGR) matrices
//!
//! For a group, every pair of observed days `x < y` gets the mean of the
//! per-subject log-ratio rates `ln(v_y / v_x) / (y - x)` over the subjects
//! that have positive values on both days. The matrix is symmetric; the
//! diagonal and pairs without any contributing subject are `None`.

use std::collections::BTreeMap;

use growthlab_stats::{log_growth_rate, mean};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::types::{distinct_days, group_subjects, Subject};

/// One subject's rate feeding a matrix cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualRate {
    pub subject_id: String,
    pub rate: f64,
}

/// Growth-rate matrix of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TgrMatrix {
    pub group: String,
    /// Sorted distinct days across the group
    pub days: Vec<f64>,
    /// `values[i][j]` is the mean rate between `days[i]` and `days[j]`
    pub values: Vec<Vec<Option<f64>>>,
    /// Per-subject rates keyed by [`TgrMatrix::pair_key`]
    pub individual_data: BTreeMap<String, Vec<IndividualRate>>,
}

impl TgrMatrix {
    /// Build the matrix for `members` of `group`
    pub fn build(group: impl Into<String>, members: &[&Subject]) -> Self {
        let group = group.into();
        let days = distinct_days(members.iter().copied());
        let n = days.len();

        let mut cells: BTreeMap<(usize, usize), Vec<IndividualRate>> = BTreeMap::new();
        for subject in members {
            let points: Vec<(usize, f64, f64)> = subject
                .points()
                .filter(|(_, v)| *v > 0.0 && v.is_finite())
                .filter_map(|(d, v)| {
                    days.binary_search_by(|x| x.total_cmp(&d))
                        .ok()
                        .map(|i| (i, d, v))
                })
                .collect();

            for (a, &(i, x, vx)) in points.iter().enumerate() {
                for &(j, y, vy) in &points[a + 1..] {
                    let Some(rate) = log_growth_rate(x, vx, y, vy) else {
                        continue;
                    };
                    cells.entry((i, j)).or_default().push(IndividualRate {
                        subject_id: subject.id.clone(),
                        rate,
                    });
                }
            }
        }

        let mut values = vec![vec![None; n]; n];
        let mut individual_data = BTreeMap::new();
        for ((i, j), rates) in cells {
            let rs: Vec<f64> = rates.iter().map(|r| r.rate).collect();
            let cell = mean(&rs);
            values[i][j] = cell;
            values[j][i] = cell;
            individual_data.insert(Self::pair_key(days[i], days[j]), rates);
        }

        tracing::debug!(
            "Built TGR matrix for {}: {} days, {} populated pairs",
            group,
            n,
            individual_data.len()
        );

        Self {
            group,
            days,
            values,
            individual_data,
        }
    }

    /// Key of the `individual_data` entry for a day pair, smaller day first
    pub fn pair_key(x: f64, y: f64) -> String {
        let (lo, hi) = if x <= y { (x, y) } else { (y, x) };
        format!("{lo}-{hi}")
    }

    pub fn day_index(&self, day: f64) -> Option<usize> {
        self.days.binary_search_by(|x| x.total_cmp(&day)).ok()
    }

    /// Mean rate between two days, in either order
    pub fn rate(&self, x: f64, y: f64) -> Option<f64> {
        let i = self.day_index(x)?;
        let j = self.day_index(y)?;
        self.values[i][j]
    }

    /// Per-subject rates between two days, in either order
    pub fn individual_rates(&self, x: f64, y: f64) -> Vec<f64> {
        self.individual_data
            .get(&Self::pair_key(x, y))
            .map(|rates| rates.iter().map(|r| r.rate).collect())
            .unwrap_or_default()
    }

    /// Number of subjects contributing to a cell
    pub fn contributors(&self, x: f64, y: f64) -> usize {
        self.individual_data
            .get(&Self::pair_key(x, y))
            .map_or(0, Vec::len)
    }

    /// Populated day pairs `(x, y)` with `x < y`, in row-major order
    pub fn pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        let n = self.days.len();
        (0..n)
            .flat_map(move |i| (i + 1..n).map(move |j| (i, j)))
            .filter(|&(i, j)| self.values[i][j].is_some())
            .map(|(i, j)| (self.days[i], self.days[j]))
    }
}

/// Matrix for the subjects of `group` within `subjects`
pub fn build_matrix(group: &str, subjects: &[Subject]) -> TgrMatrix {
    let members: Vec<&Subject> = subjects.iter().filter(|s| s.group == group).collect();
    TgrMatrix::build(group, &members)
}

/// One matrix per group, keyed by group name
pub fn build_group_matrices(subjects: &[Subject]) -> BTreeMap<String, TgrMatrix> {
    let groups = group_subjects(subjects);

    #[cfg(feature = "parallel")]
    let matrices: Vec<TgrMatrix> = groups
        .into_par_iter()
        .map(|(group, members)| TgrMatrix::build(group, &members))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let matrices: Vec<TgrMatrix> = groups
        .into_iter()
        .map(|(group, members)| TgrMatrix::build(group, &members))
        .collect();

    matrices.into_iter().map(|m| (m.group.clone(), m)).collect()
}

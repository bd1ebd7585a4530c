//! Batch supervisor for the parallel pathway
//!
//! Detection and matrix building are split into [`WorkerTask`]s: contiguous
//! subject ranges for the per-subject passes, one task per group for the
//! cross-subject pass and one per group for matrices. A [`Worker`] executes
//! each task; the [`Supervisor`] dispatches them (on rayon with the
//! `parallel` feature, sequentially otherwise), recomputes any failed or
//! malformed batch in-process, and concatenates the outputs in plan order.
//!
//! Plan order mirrors the synchronous detector, so both pathways produce the
//! same report.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::{OutlierConfig, ParallelConfig};
use crate::error::{BatchError, BatchResult};
use crate::matrix::{build_group_matrices, TgrMatrix};
use crate::outlier::{annotate, group_flags, subject_flags, OutlierDetector, OutlierReport};
use crate::types::{group_subjects, Flag, Subject};

/// Unit of work handed to a [`Worker`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WorkerTask {
    /// Sequential and intra-subject passes over `subjects[range]`
    AnalyzeBatch { range: Range<usize> },
    /// Cross-subject pass over one group
    AnalyzeGroup { group: String },
    /// TGR matrix of one group
    BuildMatrix { group: String },
}

impl fmt::Display for WorkerTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnalyzeBatch { range } => write!(f, "batch {}..{}", range.start, range.end),
            Self::AnalyzeGroup { group } => write!(f, "group {group}"),
            Self::BuildMatrix { group } => write!(f, "matrix {group}"),
        }
    }
}

/// A task together with the borrowed inputs it runs on
#[derive(Debug, Clone, Copy)]
pub struct WorkerRequest<'a> {
    pub task: &'a WorkerTask,
    pub subjects: &'a [Subject],
    pub config: &'a OutlierConfig,
}

/// Output of a single task
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutput {
    Flags(Vec<Flag>),
    Matrix(TgrMatrix),
}

impl BatchOutput {
    /// Whether this output is what `request` can produce: the right kind,
    /// and only flags or matrices belonging to the task's subjects
    fn matches(&self, request: &WorkerRequest<'_>) -> bool {
        match (self, request.task) {
            (Self::Flags(flags), WorkerTask::AnalyzeBatch { range }) => {
                let Some(batch) = request.subjects.get(range.clone()) else {
                    return false;
                };
                flags.iter().all(|flag| {
                    batch
                        .iter()
                        .any(|s| s.id == flag.subject_id && s.group == flag.group)
                })
            }
            (Self::Flags(flags), WorkerTask::AnalyzeGroup { group }) => {
                flags.iter().all(|flag| flag.group == *group)
            }
            (Self::Matrix(matrix), WorkerTask::BuildMatrix { group }) => matrix.group == *group,
            _ => false,
        }
    }
}

/// Executes tasks; must be shareable across rayon workers
pub trait Worker: Sync {
    fn execute(&self, request: &WorkerRequest<'_>) -> BatchResult<BatchOutput>;
}

/// Runs tasks on the calling thread with [`execute_task`]
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessWorker;

impl Worker for InProcessWorker {
    fn execute(&self, request: &WorkerRequest<'_>) -> BatchResult<BatchOutput> {
        execute_task(request)
    }
}

/// Reference computation for a task
pub fn execute_task(request: &WorkerRequest<'_>) -> BatchResult<BatchOutput> {
    let subjects = request.subjects;
    match request.task {
        WorkerTask::AnalyzeBatch { range } => {
            if range.start > range.end || range.end > subjects.len() {
                return Err(BatchError::InvalidRange {
                    start: range.start,
                    end: range.end,
                    len: subjects.len(),
                });
            }
            let flags = subjects[range.clone()]
                .iter()
                .flat_map(|s| subject_flags(s, request.config))
                .collect();
            Ok(BatchOutput::Flags(flags))
        }
        WorkerTask::AnalyzeGroup { group } => {
            let members = members_of(subjects, group)?;
            Ok(BatchOutput::Flags(group_flags(group, &members, request.config)))
        }
        WorkerTask::BuildMatrix { group } => {
            let members = members_of(subjects, group)?;
            Ok(BatchOutput::Matrix(TgrMatrix::build(group.as_str(), &members)))
        }
    }
}

fn members_of<'a>(subjects: &'a [Subject], group: &str) -> BatchResult<Vec<&'a Subject>> {
    let members: Vec<&Subject> = subjects.iter().filter(|s| s.group == group).collect();
    if members.is_empty() {
        return Err(BatchError::UnknownGroup {
            group: group.to_string(),
        });
    }
    Ok(members)
}

/// A batch that failed on the worker and again in-process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub task: WorkerTask,
    pub error: BatchError,
}

/// Detection report with any unrecoverable batch failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelReport {
    pub report: OutlierReport,
    pub failures: Vec<BatchFailure>,
}

/// Group matrices with any unrecoverable batch failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixReport {
    pub matrices: BTreeMap<String, TgrMatrix>,
    pub failures: Vec<BatchFailure>,
}

/// Plans, dispatches and merges worker tasks
#[derive(Debug, Clone)]
pub struct Supervisor<W: Worker = InProcessWorker> {
    worker: W,
    config: ParallelConfig,
}

impl Supervisor<InProcessWorker> {
    pub fn in_process(config: ParallelConfig) -> Self {
        Self::new(InProcessWorker, config)
    }
}

impl<W: Worker> Supervisor<W> {
    pub fn new(worker: W, config: ParallelConfig) -> Self {
        Self { worker, config }
    }

    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }

    /// Whether `n_subjects` goes through the batch pathway
    pub fn uses_batches(&self, n_subjects: usize) -> bool {
        self.config.enabled && n_subjects >= self.config.min_subjects
    }

    /// Subject ranges of `chunk_size`, then one group task per group
    pub fn plan_detection(&self, subjects: &[Subject]) -> Vec<WorkerTask> {
        let chunk = self.config.chunk_size.max(1);
        let mut tasks: Vec<WorkerTask> = (0..subjects.len())
            .step_by(chunk)
            .map(|start| WorkerTask::AnalyzeBatch {
                range: start..(start + chunk).min(subjects.len()),
            })
            .collect();
        tasks.extend(
            group_subjects(subjects)
                .into_iter()
                .map(|(group, _)| WorkerTask::AnalyzeGroup { group }),
        );
        tasks
    }

    /// One matrix task per group, in order of first appearance
    pub fn plan_matrices(&self, subjects: &[Subject]) -> Vec<WorkerTask> {
        group_subjects(subjects)
            .into_iter()
            .map(|(group, _)| WorkerTask::BuildMatrix { group })
            .collect()
    }

    /// Run every task, results in task order
    pub fn dispatch(
        &self,
        tasks: &[WorkerTask],
        subjects: &[Subject],
        config: &OutlierConfig,
    ) -> Vec<BatchResult<BatchOutput>> {
        #[cfg(feature = "parallel")]
        let results = tasks
            .par_iter()
            .map(|task| self.run_task(task, subjects, config))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let results = tasks
            .iter()
            .map(|task| self.run_task(task, subjects, config))
            .collect();

        results
    }

    /// Run one task on the worker, recomputing in-process on failure
    pub fn run_task(
        &self,
        task: &WorkerTask,
        subjects: &[Subject],
        config: &OutlierConfig,
    ) -> BatchResult<BatchOutput> {
        let request = WorkerRequest {
            task,
            subjects,
            config,
        };

        let error = match self.worker.execute(&request) {
            Ok(output) if output.matches(&request) => return Ok(output),
            Ok(_) => BatchError::MalformedResponse {
                task: task.to_string(),
            },
            Err(e) => e,
        };

        tracing::warn!("Worker failed on {}, recomputing in-process: {}", task, error);
        execute_task(&request)
    }

    /// Outlier detection through the batch pathway
    pub fn run_detection(&self, subjects: &[Subject], config: &OutlierConfig) -> ParallelReport {
        if !self.uses_batches(subjects.len()) {
            return ParallelReport {
                report: OutlierDetector::new(*config).analyze(subjects),
                failures: Vec::new(),
            };
        }

        let tasks = self.plan_detection(subjects);
        let results = self.dispatch(&tasks, subjects, config);

        let mut flags = Vec::new();
        let mut failures = Vec::new();
        for (task, result) in tasks.into_iter().zip(results) {
            match result {
                Ok(BatchOutput::Flags(batch)) => flags.extend(batch),
                Ok(BatchOutput::Matrix(_)) => failures.push(BatchFailure {
                    error: BatchError::MalformedResponse {
                        task: task.to_string(),
                    },
                    task,
                }),
                Err(error) => failures.push(BatchFailure { task, error }),
            }
        }

        tracing::info!(
            "Batch detection flagged {} measurements across {} subjects ({} failed batches)",
            flags.len(),
            subjects.len(),
            failures.len()
        );

        let annotations = annotate(subjects, &flags);
        ParallelReport {
            report: OutlierReport { flags, annotations },
            failures,
        }
    }

    /// Group matrices through the batch pathway
    pub fn run_matrices(&self, subjects: &[Subject], config: &OutlierConfig) -> MatrixReport {
        if !self.uses_batches(subjects.len()) {
            return MatrixReport {
                matrices: build_group_matrices(subjects),
                failures: Vec::new(),
            };
        }

        let tasks = self.plan_matrices(subjects);
        let results = self.dispatch(&tasks, subjects, config);

        let mut matrices = BTreeMap::new();
        let mut failures = Vec::new();
        for (task, result) in tasks.into_iter().zip(results) {
            match result {
                Ok(BatchOutput::Matrix(matrix)) => {
                    matrices.insert(matrix.group.clone(), matrix);
                }
                Ok(BatchOutput::Flags(_)) => failures.push(BatchFailure {
                    error: BatchError::MalformedResponse {
                        task: task.to_string(),
                    },
                    task,
                }),
                Err(error) => failures.push(BatchFailure { task, error }),
            }
        }

        MatrixReport { matrices, failures }
    }
}

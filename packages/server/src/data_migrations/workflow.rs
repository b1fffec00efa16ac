//! Migration job report
//!
//! Tracks the status of one job run and what each of its steps did. Nothing
//! here is persisted: the migrated rows are the only durable record of
//! progress, and a failed job is run again from the top.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{JobType, MigrationConfig, MigrationError, PhaseSummary};

/// Status of a job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

/// The fatal error that stopped a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub step: String,
    pub code: &'static str,
    pub message: String,
    pub ids: Vec<Uuid>,
}

/// Report for one job run
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRun {
    pub id: Uuid,
    pub job: JobType,
    pub status: JobStatus,
    pub dry_run: bool,
    pub batch_size: usize,
    pub run_in_transaction: bool,
    pub steps: Vec<PhaseSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl MigrationRun {
    pub(crate) fn start(job: JobType, config: &MigrationConfig) -> Self {
        Self {
            id: Uuid::now_v7(),
            job,
            status: JobStatus::Running,
            dry_run: config.dry_run,
            batch_size: config.batch_size,
            run_in_transaction: config.run_in_transaction,
            steps: Vec::new(),
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn record(&mut self, summary: PhaseSummary) {
        self.steps.push(summary);
    }

    /// Running -> Succeeded. A finished run is left as it is.
    pub(crate) fn succeed(&mut self) {
        if self.status == JobStatus::Running {
            self.status = JobStatus::Succeeded;
            self.finished_at = Some(Utc::now());
        }
    }

    /// Running -> Failed, keeping the first fatal error.
    pub(crate) fn fail(&mut self, step: &str, err: &MigrationError) {
        if self.status != JobStatus::Running {
            return;
        }
        self.status = JobStatus::Failed;
        self.failure = Some(FailureReport {
            step: step.to_string(),
            code: err.code(),
            message: format!("{err:#}"),
            ids: err.ids(),
        });
        self.finished_at = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    pub fn total_migrated(&self) -> usize {
        self.steps.iter().map(|s| s.migrated).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.steps.iter().map(|s| s.skipped).sum()
    }

    /// Summary for one step, if it ran.
    pub fn step(&self, name: &str) -> Option<&PhaseSummary> {
        self.steps.iter().find(|s| s.step == name)
    }
}

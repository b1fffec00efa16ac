//! Data migration framework for consolidating users and applications
//!
//! Moves Nomis, external and v2 users into `unified_users`, backfills the
//! unified creator on v1 applications and copies v2 applications into
//! `applications`. Work is done in fixed-size chunks, one transaction per
//! chunk, so a failed run keeps its progress and is simply run again.
//!
//! # Architecture
//!
//! Each step implements [`DataMigration`]: it enumerates its source ids once,
//! then hands them to a [`BatchProcessor`] with a chunk handler that fetches,
//! reconciles and upserts. Steps are grouped into [`MigrationPhase`]s which
//! the [`MigrationOrchestrator`] runs in a fixed order.
//!
//! A dry run executes every step for real inside one job-level transaction
//! and rolls it back, so later phases see what earlier ones would write.
//!
//! Every upsert is keyed by the source row's id, so re-running a step
//! overwrites rows instead of duplicating them. Existence checks in some
//! steps only save writes; correctness never depends on them.
//!
//! At most one instance of the job may run against a database at a time.
//! Steps read then write without row locks beyond each chunk's transaction.
//!
//! # Usage
//!
//! 1. Implement the `DataMigration` trait for your step
//! 2. Register it in `all_migrations` in phase order
//! 3. Run via `migrate_cli run <job>`

pub mod applications;
pub mod batch;
pub mod error;
pub mod orchestrator;
pub mod placeholder;
pub mod reconcile;
pub mod users;
mod workflow;

pub use batch::{
    partition, BatchProcessor, ChunkOutcome, ChunkProgress, FailurePolicy, PhaseSummary,
    TransactionScope,
};
pub use error::MigrationError;
pub use orchestrator::MigrationOrchestrator;
pub use workflow::{FailureReport, JobStatus, MigrationRun};

use async_trait::async_trait;
use serde::Serialize;
use typed_builder::TypedBuilder;

use crate::kernel::MigrationDeps;

/// Phases in the order they run. Later phases depend on earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    /// Nomis, external and v2 users into `unified_users`.
    Users,
    /// Legacy rows for v2 users.
    Placeholders,
    /// Unified creator on v1 applications.
    ApplicationUpdate,
    /// v2 applications into `applications`.
    ApplicationMigrate,
}

/// Result of verification check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum VerifyResult {
    /// All items have been migrated
    Passed,
    /// Some items remain to be migrated
    Incomplete { remaining: i64 },
    /// Verification failed with issues
    Failed { issues: Vec<String> },
}

impl VerifyResult {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Ids fetched per read while verifying.
const VERIFY_CHUNK_SIZE: usize = 500;

/// Verification findings, keeping the first few issue messages.
#[derive(Debug, Default)]
pub(crate) struct Findings {
    missing: i64,
    mismatched: usize,
    issues: Vec<String>,
}

impl Findings {
    const MAX_ISSUES: usize = 20;

    pub(crate) fn missing(&mut self, count: usize) {
        self.missing += count as i64;
    }

    pub(crate) fn mismatch(&mut self, issue: String) {
        self.mismatched += 1;
        if self.issues.len() < Self::MAX_ISSUES {
            self.issues.push(issue);
        }
    }

    /// Mismatches outrank missing rows: rerunning fixes the latter only.
    pub(crate) fn into_result(mut self) -> VerifyResult {
        if self.mismatched > 0 {
            if self.mismatched > self.issues.len() {
                self.issues
                    .push(format!("... and {} more", self.mismatched - self.issues.len()));
            }
            if self.missing > 0 {
                self.issues.push(format!("{} rows not migrated yet", self.missing));
            }
            VerifyResult::Failed { issues: self.issues }
        } else if self.missing > 0 {
            VerifyResult::Incomplete {
                remaining: self.missing,
            }
        } else {
            VerifyResult::Passed
        }
    }
}

/// Settings for one job run.
#[derive(Debug, Clone, TypedBuilder)]
pub struct MigrationConfig {
    /// Ids per chunk.
    #[builder(default = 100)]
    pub batch_size: usize,
    /// Hold one transaction for the whole job instead of one per chunk.
    #[builder(default)]
    pub run_in_transaction: bool,
    /// Run the whole job in one transaction and roll it back at the end.
    #[builder(default)]
    pub dry_run: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Context passed to migration execution
#[derive(Clone)]
pub struct MigrationContext {
    pub deps: MigrationDeps,
}

/// One step of the job.
///
/// Each step must be:
/// - Idempotent: running it again leaves the target tables unchanged
/// - Resumable: a failed run is finished by running the step again
/// - Verifiable: can check that the step completed correctly
#[async_trait]
pub trait DataMigration: Send + Sync + 'static {
    /// Unique name, used in logs and reports
    fn name(&self) -> &'static str;

    /// Optional description shown in migration list
    fn description(&self) -> &'static str {
        ""
    }

    fn phase(&self) -> MigrationPhase;

    /// What to do when a chunk fails (default: stop the job)
    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::FailFast
    }

    /// Number of source ids the step will visit
    async fn estimate(&self, ctx: &MigrationContext) -> Result<i64, MigrationError>;

    /// Process every source id in chunks
    async fn run(
        &self,
        ctx: &MigrationContext,
        processor: &BatchProcessor,
    ) -> Result<PhaseSummary, MigrationError>;

    /// Check that every source row has its target rows
    async fn verify(&self, ctx: &MigrationContext) -> Result<VerifyResult, MigrationError>;
}

/// Registry entry for a migration
pub struct MigrationEntry {
    pub migration: Box<dyn DataMigration>,
}

impl MigrationEntry {
    pub fn new<M: DataMigration>(m: M) -> Self {
        Self {
            migration: Box::new(m),
        }
    }
}

/// Get all registered steps, in the order they run.
pub fn all_migrations() -> Vec<MigrationEntry> {
    vec![
        MigrationEntry::new(users::MigrateNomisUsers),
        MigrationEntry::new(users::MigrateExternalUsers),
        MigrationEntry::new(users::MigrateV2Users),
        MigrationEntry::new(users::SynthesizePlaceholderUsers),
        MigrationEntry::new(applications::UpdateV1Applications),
        MigrationEntry::new(applications::MigrateV2Applications),
    ]
}

/// Find a migration by name
pub fn find_migration(name: &str) -> Option<MigrationEntry> {
    all_migrations().into_iter().find(|e| e.migration.name() == name)
}

/// Entry points a job runner can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    /// Every step
    All,
    /// Nomis, external and v2 users
    Users,
    NomisUsers,
    ExternalUsers,
    V2Users,
    /// Legacy rows for v2 users
    Placeholders,
    /// v1 backfill and v2 copy
    Applications,
    V1Applications,
    V2Applications,
}

impl JobType {
    fn includes(self, migration: &dyn DataMigration) -> bool {
        match self {
            Self::All => true,
            Self::Users => migration.phase() == MigrationPhase::Users,
            Self::Placeholders => migration.phase() == MigrationPhase::Placeholders,
            Self::Applications => matches!(
                migration.phase(),
                MigrationPhase::ApplicationUpdate | MigrationPhase::ApplicationMigrate
            ),
            Self::NomisUsers => migration.name() == users::MigrateNomisUsers::NAME,
            Self::ExternalUsers => migration.name() == users::MigrateExternalUsers::NAME,
            Self::V2Users => migration.name() == users::MigrateV2Users::NAME,
            Self::V1Applications => migration.name() == applications::UpdateV1Applications::NAME,
            Self::V2Applications => migration.name() == applications::MigrateV2Applications::NAME,
        }
    }

    /// Steps this job runs, in order.
    pub fn steps(self) -> Vec<MigrationEntry> {
        all_migrations()
            .into_iter()
            .filter(|entry| self.includes(entry.migration.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(job: JobType) -> Vec<&'static str> {
        job.steps().iter().map(|e| e.migration.name()).collect()
    }

    #[test]
    fn test_registry_is_in_phase_order() {
        let phases: Vec<_> = all_migrations().iter().map(|e| e.migration.phase()).collect();
        let mut sorted = phases.clone();
        sorted.sort();
        assert_eq!(phases, sorted);
    }

    #[test]
    fn test_step_names_are_unique() {
        let mut all: Vec<_> = names(JobType::All);
        let len = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), len);
        assert!(find_migration("v2_users").is_some());
        assert!(find_migration("nope").is_none());
    }

    #[test]
    fn test_job_types_select_steps() {
        assert_eq!(names(JobType::All).len(), 6);
        assert_eq!(
            names(JobType::Users),
            vec!["nomis_users", "external_users", "v2_users"]
        );
        assert_eq!(names(JobType::Placeholders), vec!["placeholder_users"]);
        assert_eq!(
            names(JobType::Applications),
            vec!["v1_applications", "v2_applications"]
        );
        assert_eq!(names(JobType::V2Users), vec!["v2_users"]);
        assert_eq!(names(JobType::V1Applications), vec!["v1_applications"]);
    }

    #[test]
    fn test_builtin_steps_fail_fast() {
        for entry in all_migrations() {
            assert_eq!(entry.migration.failure_policy(), FailurePolicy::FailFast);
        }
    }

    #[test]
    fn test_findings_report_mismatches_before_missing_rows() {
        let mut findings = Findings::default();
        assert_eq!(Findings::default().into_result(), VerifyResult::Passed);

        findings.missing(3);
        assert_eq!(
            std::mem::take(&mut findings).into_result(),
            VerifyResult::Incomplete { remaining: 3 }
        );

        findings.missing(1);
        for i in 0..25 {
            findings.mismatch(format!("row {i} differs"));
        }
        match findings.into_result() {
            VerifyResult::Failed { issues } => {
                assert_eq!(issues.len(), Findings::MAX_ISSUES + 2);
                assert_eq!(issues[Findings::MAX_ISSUES], "... and 5 more");
                assert_eq!(issues[Findings::MAX_ISSUES + 1], "1 rows not migrated yet");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = MigrationConfig::default();
        assert_eq!(config.batch_size, 100);
        assert!(!config.run_in_transaction);
        assert!(!config.dry_run);
    }
}

//! Runs the steps of a job in phase order.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{
    BatchProcessor, ChunkProgress, JobType, MigrationConfig, MigrationContext, MigrationError, MigrationPhase,
    MigrationRun, TransactionScope, VerifyResult,
};
use crate::kernel::MigrationDeps;

/// Source row count for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepEstimate {
    pub step: &'static str,
    pub phase: MigrationPhase,
    pub count: i64,
}

/// Verification outcome for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepVerification {
    pub step: &'static str,
    pub result: VerifyResult,
}

/// Sequences the phases of a job.
///
/// Phases run strictly in order (users, placeholders, application update,
/// application migrate) and a failed step stops the job. There is no
/// rollback between phases: rerunning the job is the recovery path.
pub struct MigrationOrchestrator {
    deps: MigrationDeps,
    config: MigrationConfig,
    cancel: CancellationToken,
    progress: Option<UnboundedSender<ChunkProgress>>,
}

impl MigrationOrchestrator {
    pub fn new(deps: MigrationDeps, config: MigrationConfig) -> Self {
        Self {
            deps,
            config,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Stop between chunks once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send running totals to `progress` after every chunk of every step.
    pub fn with_progress(mut self, progress: UnboundedSender<ChunkProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn context(&self) -> MigrationContext {
        MigrationContext {
            deps: self.deps.clone(),
        }
    }

    pub async fn estimate(&self, job: JobType) -> Result<Vec<StepEstimate>, MigrationError> {
        let ctx = self.context();
        let mut estimates = Vec::new();
        for entry in job.steps() {
            let migration = entry.migration;
            estimates.push(StepEstimate {
                step: migration.name(),
                phase: migration.phase(),
                count: migration.estimate(&ctx).await?,
            });
        }
        Ok(estimates)
    }

    pub async fn verify(&self, job: JobType) -> Result<Vec<StepVerification>, MigrationError> {
        let ctx = self.context();
        let mut results = Vec::new();
        for entry in job.steps() {
            let migration = entry.migration;
            let result = migration.verify(&ctx).await?;
            info!(step = migration.name(), ?result, "Verified step");
            results.push(StepVerification {
                step: migration.name(),
                result,
            });
        }
        Ok(results)
    }

    /// Run every step of `job`. The report carries the first fatal error.
    ///
    /// A dry run always holds a job-level transaction, rolled back once the
    /// last step is done.
    pub async fn run(&self, job: JobType) -> MigrationRun {
        let mut run = MigrationRun::start(job, &self.config);
        let dry_run = self.config.dry_run;
        let in_transaction = self.config.run_in_transaction || dry_run;
        info!(
            run_id = %run.id,
            ?job,
            batch_size = self.config.batch_size,
            dry_run,
            in_transaction,
            "Starting migration job"
        );

        let scope = if in_transaction {
            TransactionScope::Job
        } else {
            TransactionScope::PerChunk
        };
        let mut processor = BatchProcessor::new(
            self.config.batch_size,
            self.deps.transactions.clone(),
            scope,
            self.cancel.clone(),
        );
        if let Some(progress) = &self.progress {
            processor = processor.with_progress(progress.clone());
        }
        let ctx = self.context();

        if in_transaction {
            if let Err(err) = self.deps.transactions.begin().await {
                let err = MigrationError::Storage(err);
                error!(error = %err, "Failed to open job transaction");
                run.fail("begin", &err);
                return run;
            }
        }

        let mut current_phase = None;
        for entry in job.steps() {
            let migration = entry.migration;
            if current_phase != Some(migration.phase()) {
                info!(phase = ?migration.phase(), "Entering phase");
                current_phase = Some(migration.phase());
            }

            match migration.run(&ctx, &processor).await {
                Ok(summary) => {
                    info!(
                        step = migration.name(),
                        migrated = summary.migrated,
                        skipped = summary.skipped,
                        failed_chunks = summary.failed_chunks,
                        "Step complete"
                    );
                    run.record(summary);
                }
                Err(err) => {
                    error!(
                        step = migration.name(),
                        code = err.code(),
                        error = %err,
                        "Step failed, stopping job"
                    );
                    if in_transaction {
                        if let Err(rollback_err) = self.deps.transactions.rollback().await {
                            error!(error = %rollback_err, "Failed to roll back job transaction");
                        }
                    }
                    run.fail(migration.name(), &err);
                    return run;
                }
            }
        }

        if dry_run {
            if let Err(err) = self.deps.transactions.rollback().await {
                let err = MigrationError::Storage(err);
                error!(error = %err, "Failed to roll back dry run");
                run.fail("rollback", &err);
                return run;
            }
            info!("Dry run rolled back");
        } else if in_transaction {
            if let Err(err) = self.deps.transactions.commit().await {
                let err = MigrationError::Storage(err);
                error!(error = %err, "Failed to commit job transaction");
                run.fail("commit", &err);
                return run;
            }
        }

        run.succeed();
        info!(
            run_id = %run.id,
            migrated = run.total_migrated(),
            skipped = run.total_skipped(),
            "Migration job succeeded"
        );
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_migrations::JobStatus;
    use crate::kernel::InMemoryStore;

    #[tokio::test]
    async fn test_empty_store_runs_every_step() {
        let store = InMemoryStore::new();
        let orchestrator = MigrationOrchestrator::new(store.deps(), MigrationConfig::default());

        let run = orchestrator.run(JobType::All).await;

        assert_eq!(run.status, JobStatus::Succeeded);
        assert_eq!(run.steps.len(), 6);
        assert_eq!(run.total_migrated(), 0);
    }

    #[tokio::test]
    async fn test_estimate_lists_selected_steps() {
        let store = InMemoryStore::new();
        let orchestrator = MigrationOrchestrator::new(store.deps(), MigrationConfig::default());

        let estimates = orchestrator.estimate(JobType::Applications).await.unwrap();

        assert_eq!(
            estimates.iter().map(|e| e.step).collect::<Vec<_>>(),
            vec!["v1_applications", "v2_applications"]
        );
        assert!(estimates.iter().all(|e| e.count == 0));
    }

    #[tokio::test]
    async fn test_zero_batch_size_fails_the_job() {
        let store = InMemoryStore::new();
        let config = MigrationConfig::builder().batch_size(0).build();
        let run = MigrationOrchestrator::new(store.deps(), config)
            .run(JobType::NomisUsers)
            .await;

        assert_eq!(run.status, JobStatus::Failed);
        assert_eq!(run.failure.unwrap().code, "invalid_batch_size");
    }
}

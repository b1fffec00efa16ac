//! Chunked processing of id sets.
//!
//! A step enumerates its source ids once, then hands them to a
//! [`BatchProcessor`] together with a chunk handler. The processor splits the
//! ids into fixed-size chunks and runs the handler on each one in order, each
//! chunk in its own transaction unless the whole job runs in one.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::MigrationError;
use crate::common::Id;
use crate::kernel::BaseTransactionManager;

/// Split `ids` into chunks of `batch_size`, the last one possibly shorter.
///
/// Chunk order follows input order. An empty input gives no chunks.
pub fn partition<T>(ids: Vec<Id<T>>, batch_size: usize) -> Result<Vec<Vec<Id<T>>>, MigrationError> {
    if batch_size == 0 {
        return Err(MigrationError::InvalidBatchSize);
    }
    Ok(ids.chunks(batch_size).map(<[Id<T>]>::to_vec).collect())
}

/// What a step does when one of its chunks fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum FailurePolicy {
    /// Stop at the first failed chunk. Earlier chunks stay committed.
    FailFast,
    /// Roll back the failed chunk, record its ids and carry on, until more
    /// than `error_budget` chunks have failed. Reserved for row-level backfill
    /// jobs; the consolidation steps all fail fast.
    SkipFailedChunks { error_budget: usize },
}

/// Where chunk writes are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionScope {
    /// Begin and commit around every chunk.
    PerChunk,
    /// The caller holds one transaction for the whole job.
    Job,
}

/// Result of one chunk handler call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChunkOutcome {
    /// Rows written, or that would be written on a dry run.
    pub migrated: usize,
    /// Ids needing no write: already up to date, or gone from the source.
    pub skipped: usize,
}

impl ChunkOutcome {
    pub fn new(migrated: usize, skipped: usize) -> Self {
        Self { migrated, skipped }
    }
}

/// Totals for one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhaseSummary {
    pub step: String,
    pub total: usize,
    pub chunks: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub failed_chunks: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_ids: Vec<Uuid>,
}

impl PhaseSummary {
    fn new(step: &str, total: usize) -> Self {
        Self {
            step: step.to_string(),
            total,
            ..Default::default()
        }
    }
}

/// Running totals for a step, sent after every chunk it finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkProgress {
    pub step: String,
    pub chunk: usize,
    pub chunks: usize,
    /// Ids handled so far, skipped failed chunks included.
    pub processed: usize,
    pub total: usize,
    pub migrated: usize,
    pub skipped: usize,
}

/// Runs a chunk handler over an id set.
pub struct BatchProcessor {
    batch_size: usize,
    transactions: Arc<dyn BaseTransactionManager>,
    scope: TransactionScope,
    cancel: CancellationToken,
    progress: Option<UnboundedSender<ChunkProgress>>,
}

impl BatchProcessor {
    pub fn new(
        batch_size: usize,
        transactions: Arc<dyn BaseTransactionManager>,
        scope: TransactionScope,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            batch_size,
            transactions,
            scope,
            cancel,
            progress: None,
        }
    }

    /// Report progress on `progress` after every chunk.
    pub fn with_progress(mut self, progress: UnboundedSender<ChunkProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn report(&self, summary: &PhaseSummary, chunk: usize, chunks: usize, processed: usize) {
        let Some(progress) = &self.progress else {
            return;
        };
        // A listener that went away does not stop the migration.
        let _ = progress.send(ChunkProgress {
            step: summary.step.clone(),
            chunk,
            chunks,
            processed,
            total: summary.total,
            migrated: summary.migrated,
            skipped: summary.skipped,
        });
    }

    /// Process `ids` chunk by chunk with `handler`.
    ///
    /// Cancellation is checked before every chunk. Inside a job-level
    /// transaction a failed chunk cannot be rolled back on its own, so every
    /// failure is fatal there whatever `policy` says.
    pub async fn run<T, F, Fut>(
        &self,
        step: &str,
        policy: FailurePolicy,
        ids: Vec<Id<T>>,
        mut handler: F,
    ) -> Result<PhaseSummary, MigrationError>
    where
        F: FnMut(Vec<Id<T>>) -> Fut,
        Fut: Future<Output = Result<ChunkOutcome, MigrationError>>,
    {
        let mut summary = PhaseSummary::new(step, ids.len());
        let chunks = partition(ids, self.batch_size)?;
        let chunk_count = chunks.len();

        let policy = match self.scope {
            TransactionScope::PerChunk => policy,
            TransactionScope::Job => FailurePolicy::FailFast,
        };

        info!(step, total = summary.total, chunks = chunk_count, "Starting step");
        let mut processed = 0;

        for (index, chunk) in chunks.into_iter().enumerate() {
            let chunk_number = index + 1;
            if self.cancel.is_cancelled() {
                warn!(step, chunk = chunk_number, "Cancelled before chunk");
                return Err(MigrationError::Cancelled);
            }

            info!(
                step,
                chunk = chunk_number,
                chunks = chunk_count,
                chunk_size = chunk.len(),
                "Processing chunk"
            );
            let chunk_ids: Vec<Uuid> = chunk.iter().map(|id| id.into_uuid()).collect();
            processed += chunk_ids.len();

            if self.scope == TransactionScope::PerChunk {
                self.transactions.begin().await?;
            }

            match handler(chunk).await {
                Ok(outcome) => {
                    if self.scope == TransactionScope::PerChunk {
                        self.transactions.commit().await?;
                    }
                    summary.chunks += 1;
                    summary.migrated += outcome.migrated;
                    summary.skipped += outcome.skipped;
                    info!(
                        step,
                        chunk = chunk_number,
                        migrated = outcome.migrated,
                        skipped = outcome.skipped,
                        "Chunk complete"
                    );
                    self.report(&summary, chunk_number, chunk_count, processed);
                }
                Err(err) => {
                    if self.scope == TransactionScope::PerChunk {
                        if let Err(rollback_err) = self.transactions.rollback().await {
                            error!(step, chunk = chunk_number, error = %rollback_err, "Rollback failed");
                        }
                    }

                    match policy {
                        FailurePolicy::SkipFailedChunks { error_budget } if err.is_skippable() => {
                            summary.failed_chunks += 1;
                            summary.failed_ids.extend(chunk_ids);
                            warn!(
                                step,
                                chunk = chunk_number,
                                failed_chunks = summary.failed_chunks,
                                error = %err,
                                "Skipping failed chunk"
                            );

                            if summary.failed_chunks > error_budget {
                                error!(step, error_budget, "Error budget exceeded");
                                return Err(MigrationError::ErrorBudgetExceeded {
                                    step: step.to_string(),
                                    failed_chunks: summary.failed_chunks,
                                    budget: error_budget,
                                });
                            }
                            self.report(&summary, chunk_number, chunk_count, processed);
                        }
                        _ => {
                            error!(step, chunk = chunk_number, code = err.code(), error = %err, "Chunk failed");
                            return Err(err);
                        }
                    }
                }
            }
        }

        debug!(step, ?summary, "Step finished");
        Ok(summary)
    }
}

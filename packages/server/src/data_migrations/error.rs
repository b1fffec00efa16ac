//! Errors raised by migration steps.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MigrationError {
    /// A referenced row is missing. Means a step ran before the step that
    /// creates what it depends on.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Writing a whole chunk failed.
    #[error("failed to save {} rows into {table}: {source:#}", ids.len())]
    ChunkSave {
        table: &'static str,
        ids: Vec<Uuid>,
        #[source]
        source: anyhow::Error,
    },

    /// One record could not be transformed. Reserved for row-level backfill
    /// jobs that run under `FailurePolicy::SkipFailedChunks`.
    #[error("{entity} {id}: {reason}")]
    RowLevel {
        entity: &'static str,
        id: Uuid,
        reason: String,
    },

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("batch size must be greater than zero")]
    InvalidBatchSize,

    #[error("migration cancelled")]
    Cancelled,

    #[error("{step}: {failed_chunks} failed chunks exceed the error budget of {budget}")]
    ErrorBudgetExceeded {
        step: String,
        failed_chunks: usize,
        budget: usize,
    },
}

impl MigrationError {
    /// Stable machine-readable code for reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::ChunkSave { .. } => "chunk_save_failed",
            Self::RowLevel { .. } => "row_failed",
            Self::Storage(_) => "storage",
            Self::InvalidBatchSize => "invalid_batch_size",
            Self::Cancelled => "cancelled",
            Self::ErrorBudgetExceeded { .. } => "error_budget_exceeded",
        }
    }

    /// Ids of the records involved, if any.
    pub fn ids(&self) -> Vec<Uuid> {
        match self {
            Self::NotFound { id, .. } | Self::RowLevel { id, .. } => vec![*id],
            Self::ChunkSave { ids, .. } => ids.clone(),
            _ => Vec::new(),
        }
    }

    /// Failures confined to one chunk's data. Anything else halts the step
    /// whatever its failure policy.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::ChunkSave { .. } | Self::RowLevel { .. })
    }

    pub fn not_found<T>(entity: &'static str, id: crate::common::Id<T>) -> Self {
        Self::NotFound {
            entity,
            id: id.into_uuid(),
        }
    }

    pub fn chunk_save<T>(
        table: &'static str,
        ids: &[crate::common::Id<T>],
        source: anyhow::Error,
    ) -> Self {
        Self::ChunkSave {
            table,
            ids: ids.iter().map(|id| id.into_uuid()).collect(),
            source,
        }
    }
}

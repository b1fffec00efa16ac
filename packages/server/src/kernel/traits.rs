// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - the narrow data-access contract the
// migration engine consumes. Reconciliation and sequencing live in
// data_migrations and only ever talk to storage through these.
//
// Naming convention: Base* for trait names (e.g., BaseRepository)

use anyhow::Result;
use async_trait::async_trait;

use super::Record;
use crate::common::Id;

// =============================================================================
// Repository Trait (Infrastructure - one per table)
// =============================================================================

#[async_trait]
pub trait BaseRepository<R: Record>: Send + Sync {
    /// Every primary key in the table.
    ///
    /// Taken once at the start of a step; rows inserted afterwards are not
    /// picked up by that step.
    async fn find_all_ids(&self) -> Result<Vec<Id<R>>>;

    /// Rows for the given ids. Ids with no row are left out of the result.
    async fn find_all_by_id(&self, ids: &[Id<R>]) -> Result<Vec<R>>;

    /// A single row, for one-off lookups while reconciling.
    async fn find_by_id(&self, id: Id<R>) -> Result<Option<R>>;

    /// Upsert keyed by primary key: existing rows are overwritten, new rows
    /// inserted. Saving the same rows twice leaves the table unchanged.
    async fn save_all_and_flush(&self, records: Vec<R>) -> Result<()>;

    /// Number of rows in the table.
    async fn count(&self) -> Result<i64>;
}

// =============================================================================
// Transaction Trait (Infrastructure - scoped unit of work)
// =============================================================================

/// Scoped transaction over every repository backed by the same store.
///
/// At most one transaction is open at a time; writes made through any
/// repository between `begin` and `commit` become visible together, and
/// `rollback` discards them.
#[async_trait]
pub trait BaseTransactionManager: Send + Sync {
    async fn begin(&self) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;
}

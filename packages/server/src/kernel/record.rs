//! Record trait for rows the migration reads and writes.

use crate::common::Id;

/// A row keyed by a typed UUID primary key.
pub trait Record: Clone + Send + Sync + Sized + 'static {
    /// The table name for this record type.
    const TABLE: &'static str;

    /// Name used in logs and errors, e.g. "unified user".
    const ENTITY: &'static str;

    /// Primary key of this row.
    fn id(&self) -> Id<Self>;
}

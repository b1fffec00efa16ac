//! Kernel module - storage infrastructure and dependencies.

pub mod deps;
pub mod postgres;
pub mod record;
pub mod test_dependencies;
pub mod traits;

pub use deps::MigrationDeps;
pub use postgres::{PgRecord, PgRepository, PgStore};
pub use record::Record;
pub use test_dependencies::{InMemoryStore, InMemoryTable};
pub use traits::*;

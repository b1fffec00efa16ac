// Case migration - user and application consolidation
//
// Batch engine that moves Nomis, external and v2 users into the unified user
// table and merges v1 and v2 applications into one application table.
//
// Steps live in data_migrations/, storage seams in kernel/.

pub mod common;
pub mod config;
pub mod data_migrations;
pub mod domains;
pub mod kernel;

pub use config::*;

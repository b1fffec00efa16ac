// Common test utilities
#![allow(dead_code)]

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;

use case_migration::data_migrations::{JobType, MigrationConfig, MigrationOrchestrator, MigrationRun};
use case_migration::kernel::MigrationDeps;

/// Route tracing output through the test writer. Respects RUST_LOG.
///
/// Run tests with: RUST_LOG=debug cargo test -- --nocapture
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Run one job with the given config.
pub async fn run_job(deps: &MigrationDeps, job: JobType, config: MigrationConfig) -> MigrationRun {
    MigrationOrchestrator::new(deps.clone(), config).run(job).await
}

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

use crate::data_migrations::MigrationConfig;

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub migration_batch_size: usize,
    pub migration_run_in_transaction: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            migration_batch_size: env::var("MIGRATION_BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("MIGRATION_BATCH_SIZE must be a valid number")?,
            migration_run_in_transaction: env::var("MIGRATION_RUN_IN_TRANSACTION")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("MIGRATION_RUN_IN_TRANSACTION must be true or false")?,
        })
    }

    /// Engine settings from this config, before command-line overrides.
    pub fn migration(&self) -> MigrationConfig {
        MigrationConfig::builder()
            .batch_size(self.migration_batch_size)
            .run_in_transaction(self.migration_run_in_transaction)
            .build()
    }
}

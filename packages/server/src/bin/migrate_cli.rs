//! CLI for running the user and application migration
//!
//! Called by the job runner. Every line on stdout is one JSON object; logs go
//! to stderr. Exits non-zero when a job or verification fails.

use anyhow::{Context, Result};
use case_migration::config::Config;
use case_migration::data_migrations::orchestrator::{StepEstimate, StepVerification};
use case_migration::data_migrations::{
    all_migrations, ChunkProgress, JobType, MigrationOrchestrator, MigrationRun,
};
use case_migration::kernel::MigrationDeps;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::PgPool;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "migrate_cli")]
#[command(about = "Migrate users and applications into the unified tables")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all registered steps
    List,

    /// Count the source rows each step of a job will visit
    Estimate {
        #[arg(value_enum)]
        job: JobType,
    },

    /// Run a job
    Run {
        #[arg(value_enum)]
        job: JobType,
        /// Ids per chunk (default: MIGRATION_BATCH_SIZE or 100)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Reconcile without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Run the whole job in one transaction
        #[arg(long)]
        in_transaction: bool,
    },

    /// Check that every step of a job has completed
    Verify {
        #[arg(value_enum)]
        job: JobType,
    },
}

// ============================================================================
// JSON Response Types
// ============================================================================

#[derive(Serialize, Default)]
struct Response {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    migrations: Option<Vec<MigrationInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimates: Option<Vec<StepEstimate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verifications: Option<Vec<StepVerification>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    run: Option<MigrationRun>,
}

#[derive(Serialize)]
struct MigrationInfo {
    name: String,
    phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Serialize, Default)]
struct ProgressUpdate {
    #[serde(rename = "type")]
    update_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl From<ChunkProgress> for ProgressUpdate {
    fn from(progress: ChunkProgress) -> Self {
        Self {
            update_type: "progress",
            completed: Some(progress.processed as i64),
            total: Some(progress.total as i64),
            message: Some(format!(
                "Chunk {}/{}: migrated {}, skipped {}",
                progress.chunk, progress.chunks, progress.migrated, progress.skipped
            )),
            step: Some(progress.step),
        }
    }
}

fn output<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,case_migration=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => cmd_list(),
        Commands::Estimate { job } => cmd_estimate(job).await,
        Commands::Run {
            job,
            batch_size,
            dry_run,
            in_transaction,
        } => cmd_run(job, batch_size, dry_run, in_transaction).await,
        Commands::Verify { job } => cmd_verify(job).await,
    }
}

async fn connect(config: &Config) -> Result<MigrationDeps> {
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    Ok(MigrationDeps::postgres(pool))
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_list() -> Result<ExitCode> {
    let migrations: Vec<MigrationInfo> = all_migrations()
        .into_iter()
        .map(|e| MigrationInfo {
            name: e.migration.name().to_string(),
            phase: format!("{:?}", e.migration.phase()),
            description: {
                let desc = e.migration.description();
                if desc.is_empty() {
                    None
                } else {
                    Some(desc.to_string())
                }
            },
        })
        .collect();

    output(&Response {
        success: true,
        migrations: Some(migrations),
        ..Default::default()
    })?;

    Ok(ExitCode::SUCCESS)
}

async fn cmd_estimate(job: JobType) -> Result<ExitCode> {
    let config = Config::from_env()?;
    let orchestrator = MigrationOrchestrator::new(connect(&config).await?, config.migration());

    let estimates = orchestrator.estimate(job).await?;
    let count = estimates.iter().map(|e| e.count).sum();

    output(&Response {
        success: true,
        count: Some(count),
        estimates: Some(estimates),
        ..Default::default()
    })?;

    Ok(ExitCode::SUCCESS)
}

async fn cmd_run(
    job: JobType,
    batch_size: Option<usize>,
    dry_run: bool,
    in_transaction: bool,
) -> Result<ExitCode> {
    let config = Config::from_env()?;
    let mut migration = config.migration();
    if let Some(batch_size) = batch_size {
        migration.batch_size = batch_size;
    }
    migration.dry_run = dry_run;
    migration.run_in_transaction |= in_transaction;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current chunk");
            on_ctrl_c.cancel();
        }
    });

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ChunkProgress>();
    let printer = tokio::spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            output(&ProgressUpdate::from(progress))?;
        }
        anyhow::Ok(())
    });

    let orchestrator = MigrationOrchestrator::new(connect(&config).await?, migration)
        .with_cancellation(cancel)
        .with_progress(progress_tx);

    let total = orchestrator.estimate(job).await?.iter().map(|e| e.count).sum();
    output(&ProgressUpdate {
        update_type: "init",
        total: Some(total),
        ..Default::default()
    })?;

    let run = orchestrator.run(job).await;
    // Closes the channel so the printer drains and stops.
    drop(orchestrator);
    printer.await.context("Progress printer panicked")??;
    let success = run.is_success();
    let message = match &run.failure {
        Some(failure) => format!("{} failed: {}", failure.step, failure.message),
        None => format!(
            "Migrated: {}, Skipped: {}",
            run.total_migrated(),
            run.total_skipped()
        ),
    };

    output(&ProgressUpdate {
        update_type: if success { "complete" } else { "error" },
        message: Some(message),
        ..Default::default()
    })?;
    output(&Response {
        success,
        run: Some(run),
        ..Default::default()
    })?;

    Ok(exit_code(success))
}

async fn cmd_verify(job: JobType) -> Result<ExitCode> {
    let config = Config::from_env()?;
    let orchestrator = MigrationOrchestrator::new(connect(&config).await?, config.migration());

    let verifications = orchestrator.verify(job).await?;
    let success = verifications.iter().all(|v| v.result.is_passed());

    output(&Response {
        success,
        message: (!success).then(|| "Migration incomplete or inconsistent".to_string()),
        verifications: Some(verifications),
        ..Default::default()
    })?;

    Ok(exit_code(success))
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use jobfeed_core::Resume;
use jobfeed_extract::{ChatClient, LlmExtractor};
use jobfeed_storage::{JobRepository, MemoryStore, PgStore};
use jobfeed_sync::{IngestionPipeline, IngestionSummary, SourceRegistry, SyncConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "jobfeed-cli")]
#[command(about = "Job feed ingestion command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one ingestion pass over every enabled source.
    Sync {
        /// Keep results in memory instead of writing to Postgres.
        #[arg(long)]
        dry_run: bool,
    },
    Migrate,
    /// Run the ingestion pass on `SYNC_CRON` until interrupted.
    Schedule,
    #[command(subcommand)]
    Resume(ResumeCommands),
}

#[derive(Debug, Subcommand)]
enum ResumeCommands {
    /// Extract a structured resume from a plain-text file.
    Extract { file: PathBuf },
    /// Tailor a structured resume (JSON) to a job description (plain text).
    Tailor { resume: PathBuf, job: PathBuf },
}

async fn connect_store(config: &SyncConfig) -> Result<Arc<dyn JobRepository>> {
    let store = PgStore::connect(&config.database_url)
        .await
        .context("connecting to DATABASE_URL")?;
    store.migrate().await?;
    Ok(Arc::new(store))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

fn print_summary(summary: &IngestionSummary) {
    println!(
        "sync complete: run_id={} discovered={} created={} duplicates={} skipped={} cancelled={} reports={}",
        summary.run_id,
        summary.discovered,
        summary.created,
        summary.duplicates.len(),
        summary.skipped.len(),
        summary.cancelled,
        summary.reports_dir.as_deref().unwrap_or("-"),
    );
}

fn extractor(config: &SyncConfig) -> Result<LlmExtractor> {
    Ok(LlmExtractor::new(ChatClient::new(config.llm_config()?)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Sync { dry_run: false }) {
        Commands::Sync { dry_run } => {
            let registry = SourceRegistry::load(&config.workspace_root).await?;
            let store: Arc<dyn JobRepository> = if dry_run {
                Arc::new(MemoryStore::new())
            } else {
                connect_store(&config).await?
            };
            let pipeline = IngestionPipeline::from_config(&config, &registry, store)?;
            let summary = pipeline.run_until(shutdown_signal()).await?;
            print_summary(&summary);
        }
        Commands::Migrate => {
            let store = PgStore::connect(&config.database_url)
                .await
                .context("connecting to DATABASE_URL")?;
            store.migrate().await?;
            println!("migrations applied");
        }
        Commands::Schedule => {
            let registry = SourceRegistry::load(&config.workspace_root).await?;
            let store = connect_store(&config).await?;
            let pipeline = Arc::new(IngestionPipeline::from_config(&config, &registry, store)?);
            let config = SyncConfig {
                scheduler_enabled: true,
                ..config
            };
            let Some(mut scheduler) = jobfeed_sync::maybe_build_scheduler(&config, pipeline).await?
            else {
                bail!("scheduler could not be built");
            };
            scheduler.start().await.context("starting scheduler")?;
            info!(cron = %config.sync_cron, "scheduler started; ctrl-c to stop");
            shutdown_signal().await;
            scheduler.shutdown().await.context("stopping scheduler")?;
        }
        Commands::Resume(ResumeCommands::Extract { file }) => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let resume = extractor(&config)?.extract_resume(&text).await?;
            println!("{}", serde_json::to_string_pretty(&resume)?);
        }
        Commands::Resume(ResumeCommands::Tailor { resume, job }) => {
            let master: Resume = serde_json::from_str(
                &tokio::fs::read_to_string(&resume)
                    .await
                    .with_context(|| format!("reading {}", resume.display()))?,
            )
            .with_context(|| format!("parsing {}", resume.display()))?;
            let job_text = tokio::fs::read_to_string(&job)
                .await
                .with_context(|| format!("reading {}", job.display()))?;
            let tailored = extractor(&config)?.tailor_resume(&job_text, &master).await?;
            println!("{}", serde_json::to_string_pretty(&tailored)?);
        }
    }

    Ok(())
}

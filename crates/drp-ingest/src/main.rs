//! DRP Ingest - Deposit ingestion tool

use anyhow::{Context, Result};
use clap::Parser;
use drp_common::logging::{init_logging, LogConfig, LogLevel};
use drp_common::types::{DepositId, JobId};
use drp_ingest::acl::{AgentPrincipals, StaticAccessControl};
use drp_ingest::config::{IngestConfig, StorageBackend};
use drp_ingest::graph::store::DepositGraphStore;
use drp_ingest::ingestor::IngestOptions;
use drp_ingest::repository::{ContentStoreClient, HttpContentStore, MemoryContentStore};
use drp_ingest::status::{MemoryStatusStore, PgStatusStore, StatusStore};
use drp_ingest::transfer::fs::FsBinaryStore;
use drp_ingest::transfer::s3::S3BinaryStore;
use drp_ingest::transfer::BinaryStore;
use drp_ingest::{ContentIngestor, IngestError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "drp-ingest")]
#[command(author, version, about = "DRP deposit ingestion tool")]
struct Cli {
    /// Command to run
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Ingest one staged deposit
    Run {
        /// Deposit to ingest
        #[arg(short, long)]
        deposit: DepositId,

        /// Act as this agent instead of the recorded depositor
        #[arg(long)]
        agent: Option<String>,

        /// Semicolon-separated group principals for the overriding agent
        #[arg(long, requires = "agent")]
        groups: Option<String>,
    },

    /// Show the status record and progress of a deposit
    Status {
        /// Deposit to inspect
        #[arg(short, long)]
        deposit: DepositId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("drp-ingest".to_string())
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    init_logging(&log_config)?;

    match cli.command {
        Command::Run {
            deposit,
            agent,
            groups,
        } => run_deposit(deposit, agent, groups).await?,
        Command::Status { deposit } => show_status(deposit).await?,
    }

    Ok(())
}

async fn run_deposit(
    deposit: DepositId,
    agent: Option<String>,
    groups: Option<String>,
) -> Result<()> {
    let config = IngestConfig::load()?;
    let status = status_store(&config).await?;
    let client = content_store(&config)?;
    let binaries = binary_store(&config);
    let access = Arc::new(StaticAccessControl::new(config.admin_groups.clone()));

    let mut options = IngestOptions::from_config(&config);
    if let Some(name) = agent {
        let principals = match groups {
            Some(groups) => AgentPrincipals::from_permission_groups(name, &groups),
            None => AgentPrincipals::new(name),
        };
        options = options.with_agent(principals);
    }

    let ingestor = ContentIngestor::new(
        deposit,
        DepositGraphStore::new(config.graph_dir.clone()),
        status,
        client,
        access,
        binaries,
        options,
    );

    // Ctrl-C asks the job to stop at the next safe point.
    let interrupt = ingestor.interrupt_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the object in flight");
            interrupt.store(true, Ordering::Relaxed);
        }
    });

    info!(deposit_id = %deposit, "Ingesting deposit");
    match ingestor.run().await {
        Ok(summary) => {
            info!(
                created = summary.created,
                skipped = summary.skipped,
                completed = summary.completed,
                total = summary.total,
                "Ingestion complete"
            );
            Ok(())
        }
        // A paused, cancelled, or shut-down run is resumable, not failed;
        // rerun the same command to continue.
        Err(err @ IngestError::Interrupted { .. }) => {
            info!("{err}");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

async fn show_status(deposit: DepositId) -> Result<()> {
    let config = IngestConfig::load()?;
    let status = status_store(&config).await?;

    let record = status.deposit_status(&deposit).await?;
    let progress = status.job_progress(&JobId::for_deposit(&deposit)).await?;

    println!("deposit:     {}", record.deposit_id);
    println!("state:       {}", record.state);
    println!(
        "depositor:   {}",
        record.depositor_name.as_deref().unwrap_or("-")
    );
    println!(
        "destination: {}",
        record
            .destination_container_id
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("progress:    {}/{}", progress.completed, progress.total);
    if let Some(message) = record.error_message {
        println!("error:       {message}");
    }

    Ok(())
}

async fn status_store(config: &IngestConfig) -> Result<Arc<dyn StatusStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PgStatusStore::connect(url)
                .await
                .context("Failed to connect to status database")?;
            store
                .run_migrations()
                .await
                .context("Failed to run status store migrations")?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory status store");
            Ok(Arc::new(MemoryStatusStore::new()))
        }
    }
}

fn content_store(config: &IngestConfig) -> Result<Arc<dyn ContentStoreClient>> {
    match &config.repository_url {
        Some(url) => Ok(Arc::new(HttpContentStore::new(url.clone())?)),
        None => {
            warn!("DRP_REPOSITORY_URL not set, using in-memory content store");
            Ok(Arc::new(MemoryContentStore::new()))
        }
    }
}

fn binary_store(config: &IngestConfig) -> Arc<dyn BinaryStore> {
    match &config.storage {
        StorageBackend::Fs { root } => Arc::new(FsBinaryStore::new(root.clone())),
        StorageBackend::S3(s3) => Arc::new(S3BinaryStore::new(s3.clone())),
    }
}

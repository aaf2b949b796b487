use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iptv_ingest::{
    config::Config,
    job_scheduling::{JobRegistry, MemoryJobStore, SchedulerManager},
    jobs,
    repositories::InMemoryMetadataRepository,
};

#[derive(Parser)]
#[command(name = "iptv-ingest")]
#[command(version)]
#[command(about = "IPTV metadata ingestion with chained job scheduling")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path (defaults to $CONFIG_FILE, then config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Number of jobs allowed to run at once (overrides config file)
    #[arg(short = 'w', long, value_name = "N")]
    worker_pool_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("iptv_ingest={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting IPTV ingestion service v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(config_file) => {
            let config = Config::load_from_file(config_file)?;
            info!("Configuration loaded from: {}", config_file);
            config
        }
        None => Config::load()?,
    };

    if let Some(worker_pool_size) = cli.worker_pool_size {
        config.scheduler.worker_pool_size = worker_pool_size;
    }
    config.validate()?;

    let repository = Arc::new(InMemoryMetadataRepository::new());
    let mut registry = JobRegistry::new();
    jobs::register_all(&mut registry, &config, repository)?;

    let manager = SchedulerManager::new(
        config.scheduler.clone(),
        Arc::new(MemoryJobStore::new()),
        registry,
    )?;
    manager
        .schedule_jobs_and_start(jobs::default_builders(&config))
        .await?;

    let health = manager.handle().health_check().await;
    info!(
        "Scheduler running: {} job(s) registered, {} trigger(s) live",
        health.registered_jobs, health.live_triggers
    );

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    manager.shutdown().await;

    info!("IPTV ingestion service stopped");
    Ok(())
}

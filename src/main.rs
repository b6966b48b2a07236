use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod audit;
mod bitbucket;
mod checkpoint;
mod config;
mod detector;
mod error;
mod git;
mod models;
mod report;

use audit::RunContext;
use bitbucket::BitbucketClient;
use checkpoint::CheckpointStore;
use config::{AuditConfig, Settings};
use git::GitProcessor;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let started_at = chrono::Local::now().fixed_offset();
    let settings = Settings::from_env();

    let config = AuditConfig::load(&settings.config_path)
        .with_context(|| format!("Failed to load {}", settings.config_path.display()))?;

    tracing::info!(
        "Starting audit of {} with pattern '{}'",
        config.owner,
        config.pattern
    );

    let mut ctx = RunContext::new(
        started_at,
        config.clone_dir.clone(),
        settings.result_dir.clone(),
        config.pattern.clone(),
    );
    let checkpoints = CheckpointStore::new(&settings.checkpoint_path);
    tracing::debug!("Using checkpoint file {}", checkpoints.path().display());
    let lister = BitbucketClient::new(&config);
    let processor = GitProcessor::new(&config.username, &config.password);

    let summary =
        audit::run(&mut ctx, &checkpoints, &lister, &processor).context("Audit run failed")?;

    tracing::info!(
        "Audit completed: {} repositories scanned, {} changed files in {} repositories, {:?}",
        summary.repositories_scanned,
        summary.files_reported,
        summary.repositories_changed,
        summary.report_path
    );

    Ok(())
}

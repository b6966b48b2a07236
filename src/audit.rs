//! One audit cycle: checkpoint in, report and new checkpoint out.

use std::path::{Path, PathBuf};

use crate::checkpoint::CheckpointStore;
use crate::detector::{detect, Snapshot};
use crate::error::Result;
use crate::git::CloneGuard;
use crate::models::{format_timestamp, RepositoryRef, Timestamp};
use crate::report::ReportBuilder;

/// Source of the repositories to audit.
pub trait RepositoryLister {
    fn list(&self) -> Result<Vec<RepositoryRef>>;
}

/// Produces a local, queryable copy of a repository at `dest`.
pub trait Materializer {
    type Output: Snapshot;

    fn materialize(&self, repo: &RepositoryRef, dest: &Path) -> Result<Self::Output>;
}

/// State owned by a single run.
#[derive(Debug)]
pub struct RunContext {
    pub started_at: Timestamp,
    pub clone_dir: PathBuf,
    pub result_dir: PathBuf,
    pub pattern: String,
    clones: Vec<CloneGuard>,
}

impl RunContext {
    pub fn new(
        started_at: Timestamp,
        clone_dir: PathBuf,
        result_dir: PathBuf,
        pattern: String,
    ) -> Self {
        Self {
            started_at,
            clone_dir,
            result_dir,
            pattern,
            clones: Vec::new(),
        }
    }

    fn track_clone(&mut self, path: PathBuf) {
        self.clones.push(CloneGuard::new(path));
    }

    /// Delete every clone made during the run. Failures are only logged.
    pub fn release_clones(&mut self) {
        for guard in self.clones.drain(..) {
            tracing::debug!("Releasing clone {:?}", guard.path());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub repositories_scanned: usize,
    pub repositories_changed: usize,
    pub files_reported: usize,
    pub report_path: PathBuf,
}

/// Run a full audit. The checkpoint only advances when every repository was
/// scanned; clones are removed whatever the outcome.
pub fn run<L, M>(
    ctx: &mut RunContext,
    checkpoints: &CheckpointStore,
    lister: &L,
    materializer: &M,
) -> Result<RunSummary>
where
    L: RepositoryLister + ?Sized,
    M: Materializer + ?Sized,
{
    let result = run_cycle(ctx, checkpoints, lister, materializer);
    ctx.release_clones();
    result
}

fn run_cycle<L, M>(
    ctx: &mut RunContext,
    checkpoints: &CheckpointStore,
    lister: &L,
    materializer: &M,
) -> Result<RunSummary>
where
    L: RepositoryLister + ?Sized,
    M: Materializer + ?Sized,
{
    std::fs::create_dir_all(&ctx.result_dir)?;

    let checkpoint = checkpoints.load(ctx.started_at)?;

    let mut repositories = lister.list()?;
    repositories.sort();
    repositories.dedup_by(|a, b| a.name == b.name);

    let mut report = ReportBuilder::new(&ctx.result_dir, ctx.started_at.date_naive());
    report.flush()?;

    tracing::info!(
        "Auditing {} repositories for changes to '{}' since {}",
        repositories.len(),
        ctx.pattern,
        format_timestamp(&checkpoint)
    );

    for repo in &repositories {
        if let Err(e) = scan_repository(ctx, materializer, repo, &checkpoint, &mut report) {
            tracing::error!("Audit of {} failed: {}", repo.name, e);
            // Keep the blocks of repositories that completed.
            if let Err(flush_err) = report.flush() {
                tracing::warn!("Failed to write partial report: {}", flush_err);
            }
            return Err(e);
        }
    }

    report.flush()?;
    checkpoints.save(&ctx.started_at)?;

    Ok(RunSummary {
        repositories_scanned: repositories.len(),
        repositories_changed: report.repositories(),
        files_reported: report.entries(),
        report_path: report.path().to_path_buf(),
    })
}

fn scan_repository<M: Materializer + ?Sized>(
    ctx: &mut RunContext,
    materializer: &M,
    repo: &RepositoryRef,
    checkpoint: &Timestamp,
    report: &mut ReportBuilder,
) -> Result<()> {
    let dest = ctx.clone_dir.join(&repo.name);
    tracing::info!("local path: {:?}, url: {}", dest, repo.clone_url);

    // Only directories this run creates are removed afterwards.
    if !dest.exists() {
        ctx.track_clone(dest.clone());
    }
    let snapshot = materializer.materialize(repo, &dest)?;
    let changes = detect(&snapshot, &ctx.pattern, checkpoint)?;

    tracing::info!("{}: {} changed files", repo.name, changes.len());
    report.add_repository_result(&repo.name, &changes);
    Ok(())
}

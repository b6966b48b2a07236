//! Incremental change detection over a repository snapshot.

use crate::error::Result;
use crate::models::{ChangeSet, CommitRecord, Timestamp};

/// Read-only view of a repository at its default branch head.
pub trait Snapshot {
    /// Repository identifier used in errors and logs.
    fn name(&self) -> &str;

    /// Every file path in the tree at the head commit.
    fn head_files(&self) -> Result<Vec<String>>;

    /// Commits reachable from head that touched `path`, newest first.
    fn file_history(&self, path: &str) -> Result<Vec<CommitRecord>>;
}

/// Map each file whose path contains `pattern` to the newest author time of
/// any commit touching it after `checkpoint`. Files without such a commit are
/// left out. A commit exactly at `checkpoint` does not count.
pub fn detect<S: Snapshot + ?Sized>(
    snapshot: &S,
    pattern: &str,
    checkpoint: &Timestamp,
) -> Result<ChangeSet> {
    let mut changes = ChangeSet::new();

    for path in snapshot.head_files()? {
        if !path.contains(pattern) {
            continue;
        }

        let history = snapshot.file_history(&path)?;
        tracing::debug!("{}: {} commits touch {}", snapshot.name(), history.len(), path);

        let latest = history
            .iter()
            .filter(|c| c.author_time > *checkpoint)
            .max_by_key(|c| c.author_time);

        if let Some(commit) = latest {
            tracing::debug!(
                "{}: {} last changed by {} <{}> in {}",
                snapshot.name(),
                path,
                commit.author_name,
                commit.author_email,
                commit.sha
            );
            changes.insert(path, commit.author_time);
        }
    }

    Ok(changes)
}

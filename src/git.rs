use chrono::{FixedOffset, TimeZone};
use git2::{
    Cred, FetchOptions, ObjectType, Oid, RemoteCallbacks, Repository, Tree, TreeWalkMode,
    TreeWalkResult,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::audit::Materializer;
use crate::detector::Snapshot;
use crate::error::{AuditError, Result};
use crate::models::{CommitRecord, RepositoryRef, Timestamp};

/// Clones repositories with basic-auth credentials.
pub struct GitProcessor {
    username: String,
    password: String,
}

impl GitProcessor {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn clone_repo(&self, url: &str, path: &Path) -> std::result::Result<(), git2::Error> {
        let mut callbacks = RemoteCallbacks::new();
        let username = self.username.clone();
        let password = self.password.clone();
        callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
            Cred::userpass_plaintext(&username, &password)
        });

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);

        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch_options);

        match builder.clone(url, path) {
            Ok(_) => {
                tracing::info!("Successfully cloned repository");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    "Git clone error: {} (class: {:?}, code: {:?})",
                    e.message(),
                    e.class(),
                    e.code()
                );
                Err(e)
            }
        }
    }
}

impl Materializer for GitProcessor {
    type Output = GitSnapshot;

    fn materialize(&self, repo: &RepositoryRef, dest: &Path) -> Result<GitSnapshot> {
        let clone_err = |message: String| AuditError::Clone {
            repo: repo.name.clone(),
            message,
        };

        if dest.exists() {
            return Err(clone_err(format!("destination {} already exists", dest.display())));
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| clone_err(e.to_string()))?;
        }

        tracing::info!("Cloning repository {} into {:?}", repo.clone_url, dest);
        self.clone_repo(&repo.clone_url, dest)
            .map_err(|e| clone_err(e.message().to_string()))?;

        GitSnapshot::open(&repo.name, dest)
    }
}

/// Removes a cloned working directory when dropped.
#[derive(Debug)]
pub struct CloneGuard {
    path: PathBuf,
}

impl CloneGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CloneGuard {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!("Removed clone {:?}", self.path),
            Err(e) => tracing::warn!("Failed to remove clone {:?}: {}", self.path, e),
        }
    }
}

/// Commit history of a local clone, rooted at its HEAD commit.
pub struct GitSnapshot {
    name: String,
    repo: Repository,
    head: Oid,
}

impl GitSnapshot {
    pub fn open(name: &str, path: &Path) -> Result<Self> {
        let unavailable = |e: git2::Error| AuditError::HistoryUnavailable {
            repo: name.to_string(),
            message: e.message().to_string(),
        };

        let repo = Repository::open(path).map_err(unavailable)?;
        let head = repo
            .head()
            .and_then(|reference| reference.peel_to_commit())
            .map_err(unavailable)?
            .id();

        Ok(Self {
            name: name.to_string(),
            repo,
            head,
        })
    }

    fn head_tree(&self) -> std::result::Result<Tree<'_>, git2::Error> {
        self.repo.find_commit(self.head)?.tree()
    }

    /// Walk the history of `path` from head the way `git log -- <path>` does:
    /// a commit whose `path` matches one of its parents is skipped and only
    /// that parent's line is followed.
    fn commits_touching(&self, path: &str) -> std::result::Result<Vec<CommitRecord>, git2::Error> {
        let mut pending = vec![self.head];
        let mut seen = HashSet::new();
        let mut commits = Vec::new();

        while let Some(oid) = pending.pop() {
            if !seen.insert(oid) {
                continue;
            }
            let commit = self.repo.find_commit(oid)?;
            let current = entry_id(&commit.tree()?, path);
            let parents: Vec<git2::Commit<'_>> = commit.parents().collect();

            let mut same_as = None;
            for parent in &parents {
                if entry_id(&parent.tree()?, path) == current {
                    same_as = Some(parent.id());
                    break;
                }
            }
            if let Some(parent) = same_as {
                pending.push(parent);
                continue;
            }
            if parents.is_empty() && current.is_none() {
                continue;
            }

            let author = commit.author();
            commits.push(CommitRecord {
                sha: commit.id().to_string(),
                author_name: author.name().unwrap_or("").to_string(),
                author_email: author.email().unwrap_or("").to_string(),
                author_time: to_timestamp(&author.when()).ok_or_else(|| {
                    git2::Error::from_str(&format!("invalid author time on {}", commit.id()))
                })?,
            });
            pending.extend(parents.iter().map(|parent| parent.id()));
        }

        commits.sort_by(|a, b| b.author_time.cmp(&a.author_time));
        Ok(commits)
    }
}

impl Snapshot for GitSnapshot {
    fn name(&self) -> &str {
        &self.name
    }

    fn head_files(&self) -> Result<Vec<String>> {
        let unavailable = |e: git2::Error| AuditError::HistoryUnavailable {
            repo: self.name.clone(),
            message: e.message().to_string(),
        };

        let tree = self.head_tree().map_err(unavailable)?;
        let mut files = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    files.push(format!("{}{}", root, name));
                }
            }
            TreeWalkResult::Ok
        })
        .map_err(unavailable)?;

        Ok(files)
    }

    fn file_history(&self, path: &str) -> Result<Vec<CommitRecord>> {
        self.commits_touching(path)
            .map_err(|e| AuditError::FileHistoryUnavailable {
                repo: self.name.clone(),
                path: path.to_string(),
                message: e.message().to_string(),
            })
    }
}

fn entry_id(tree: &Tree<'_>, path: &str) -> Option<Oid> {
    tree.get_path(Path::new(path)).ok().map(|entry| entry.id())
}

fn to_timestamp(time: &git2::Time) -> Option<Timestamp> {
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60)?;
    offset.timestamp_opt(time.seconds(), 0).single()
}

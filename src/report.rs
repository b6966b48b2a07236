use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::{format_timestamp, ChangeSet};

/// Collects per-repository change blocks for one run's report file.
#[derive(Debug)]
pub struct ReportBuilder {
    path: PathBuf,
    text: String,
    repositories: usize,
    entries: usize,
}

impl ReportBuilder {
    /// Report for the run started on `date`, stored as `<dir>/YYYY-MM-DD.txt`.
    pub fn new(dir: &Path, date: NaiveDate) -> Self {
        Self {
            path: dir.join(format!("{}.txt", date.format("%Y-%m-%d"))),
            text: String::new(),
            repositories: 0,
            entries: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn repositories(&self) -> usize {
        self.repositories
    }

    pub fn add_repository_result(&mut self, repo: &str, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }
        for (path, time) in changes {
            self.text.push_str(&format!(
                "{} in repository({}) has changed in latest time({})\n",
                path,
                repo,
                format_timestamp(time)
            ));
        }
        self.text.push('\n');
        self.repositories += 1;
        self.entries += changes.len();
    }

    /// Write the collected blocks, replacing any report from earlier the same day.
    pub fn flush(&self) -> Result<()> {
        std::fs::write(&self.path, self.text())?;
        tracing::info!(
            "Wrote {} changed files across {} repositories to {:?}",
            self.entries,
            self.repositories,
            self.path
        );
        Ok(())
    }
}

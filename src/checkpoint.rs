use chrono::Months;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{AuditError, Result};
use crate::models::{format_timestamp, parse_timestamp, Timestamp};

/// How far back the first run looks when no checkpoint exists yet.
const FIRST_RUN_LOOKBACK: Months = Months::new(6);

/// Persists the time of the last successful audit in a single-line file.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last checkpoint, defaulting to six months before `now` on
    /// the first run. A file that exists but cannot be parsed is an error.
    pub fn load(&self, now: Timestamp) -> Result<Timestamp> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let fallback = now.checked_sub_months(FIRST_RUN_LOOKBACK).ok_or_else(|| {
                    AuditError::Checkpoint(format!("cannot compute first-run default from {}", now))
                })?;
                tracing::info!(
                    "No checkpoint at {}, starting from {}",
                    self.path.display(),
                    format_timestamp(&fallback)
                );
                return Ok(fallback);
            }
            Err(e) => {
                return Err(AuditError::Checkpoint(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let raw = content.trim_end();
        let checkpoint = parse_timestamp(raw).map_err(|e| {
            AuditError::Checkpoint(format!(
                "corrupt checkpoint {:?} in {}: {}",
                raw,
                self.path.display(),
                e
            ))
        })?;
        tracing::info!("Loaded checkpoint {}", raw);
        Ok(checkpoint)
    }

    /// Replace the checkpoint with `t`. The new value is written to a
    /// temporary file and renamed into place.
    pub fn save(&self, t: &Timestamp) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let to_checkpoint_err = |e: std::io::Error| {
            AuditError::Checkpoint(format!("failed to write {}: {}", self.path.display(), e))
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(to_checkpoint_err)?;
        tmp.write_all(format_timestamp(t).as_bytes())
            .map_err(to_checkpoint_err)?;
        tmp.as_file().sync_all().map_err(to_checkpoint_err)?;
        tmp.persist(&self.path)
            .map_err(|e| to_checkpoint_err(e.error))?;

        tracing::info!("Saved checkpoint {}", format_timestamp(t));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset, TimeZone};

    fn at(s: &str) -> Timestamp {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_first_run_defaults_to_six_months_ago() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("check.txt"));

        let loaded = store.load(at("2024-08-31T10:00:00+08:00")).unwrap();
        // Month arithmetic clamps to the last day of February.
        assert_eq!(loaded, at("2024-02-29T10:00:00+08:00"));
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("check.txt"));
        let t = FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2019, 12, 10, 13, 7, 28)
            .unwrap();

        store.save(&t).unwrap();
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "Tue Dec 10 13:07:28 2019 +0800"
        );

        let loaded = store.load(at("2030-01-01T00:00:00Z")).unwrap();
        assert_eq!(loaded, t);
        assert_eq!(loaded.offset(), t.offset());
    }

    #[test]
    fn test_save_overwrites_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("check.txt"));

        store.save(&at("2020-01-01T00:00:00Z")).unwrap();
        store.save(&at("2021-06-15T12:30:00Z")).unwrap();

        let loaded = store.load(at("2030-01-01T00:00:00Z")).unwrap();
        assert_eq!(loaded, at("2021-06-15T12:30:00Z"));
    }

    #[test]
    fn test_trailing_newline_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("check.txt");
        std::fs::write(&path, "Tue Dec 10 13:07:28 2019 +0800\n").unwrap();

        let loaded = CheckpointStore::new(&path)
            .load(at("2030-01-01T00:00:00Z"))
            .unwrap();
        assert_eq!(loaded, at("2019-12-10T13:07:28+08:00"));
    }

    #[test]
    fn test_corrupt_checkpoint_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("check.txt");
        std::fs::write(&path, "yesterday-ish").unwrap();

        let err = CheckpointStore::new(&path)
            .load(at("2030-01-01T00:00:00Z"))
            .unwrap_err();
        assert!(matches!(err, AuditError::Checkpoint(_)));
    }
}

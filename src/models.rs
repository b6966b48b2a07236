use chrono::{DateTime, FixedOffset};
use std::collections::BTreeMap;

/// Layout shared by the checkpoint file and report lines, e.g.
/// `Tue Dec 10 13:07:28 2019 +0800`.
pub const DATE_FORMAT: &str = "%a %b %d %H:%M:%S %Y %z";

pub type Timestamp = DateTime<FixedOffset>;

/// Changed file path -> latest qualifying author time. Ordered by path so
/// report output is stable.
pub type ChangeSet = BTreeMap<String, Timestamp>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RepositoryRef {
    pub name: String,
    pub clone_url: String,
}

#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub sha: String,
    pub author_name: String,
    pub author_email: String,
    pub author_time: Timestamp,
}

pub fn format_timestamp(t: &Timestamp) -> String {
    t.format(DATE_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Result<Timestamp, chrono::ParseError> {
    DateTime::parse_from_str(s, DATE_FORMAT)
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to list repositories: {0}")]
    Listing(String),

    #[error("failed to clone repository {repo}: {message}")]
    Clone { repo: String, message: String },

    #[error("history unavailable for repository {repo}: {message}")]
    HistoryUnavailable { repo: String, message: String },

    #[error("history unavailable for {path} in repository {repo}: {message}")]
    FileHistoryUnavailable {
        repo: String,
        path: String,
        message: String,
    },

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("report error: {0}")]
    Report(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;

use thiserror::Error;

use crate::project::{OwnerId, ProjectId};

/// Errors surfaced synchronously to callers of management operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatchError {
    #[error("invalid locator {0:?}: must start with http:// or https://")]
    InvalidLocator(String),
    #[error("invalid interval {0}s: must be at least 1 second")]
    InvalidInterval(i64),
    #[error("project {project} not found for owner {owner}")]
    ProjectNotFound { owner: OwnerId, project: ProjectId },
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("feed parsing error: {0}")]
    Parse(String),
    #[error("no retrieval strategy configured")]
    NoStrategy,
}

impl From<rss::Error> for RetrievalError {
    fn from(err: rss::Error) -> Self {
        RetrievalError::Parse(err.to_string())
    }
}

/// Anything that goes wrong inside a cycle other than a fetch failure.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("store write-back failed: {0}")]
    Store(#[from] WatchError),
    #[error("event channel closed unexpectedly")]
    EventChannelClosed,
    #[error("cycle panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration directory available on this platform")]
    NoConfigDir,
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config format error: {0}")]
    Format(#[from] serde_json::Error),
}

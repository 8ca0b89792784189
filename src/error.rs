use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Failures of a single completion call.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// HTTP 429 from the provider. The user can retry after a short wait.
    #[error("completion provider rate limit reached")]
    RateLimited,

    #[error("completion provider is not configured")]
    NotConfigured,

    #[error("completion request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("fact store unavailable: {0}")]
    Unavailable(String),

    #[error("fact store timed out after {0:?}")]
    Timeout(Duration),

    #[error("corrupt record under `{key}`: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history fetch failed: {0}")]
    Fetch(String),

    #[error("history fetch timed out after {0:?}")]
    Timeout(Duration),
}

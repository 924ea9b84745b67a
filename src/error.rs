//! Error types for the proxy-fetch crate.

use std::time::Duration;
use thiserror::Error;

/// Error returned when no verified proxy is available in the pool.
#[derive(Debug, Error)]
#[error("No proxy available in pool")]
pub struct NoProxyAvailable;

/// A proxy list line that could not be turned into a proxy address.
#[derive(Debug, Error, PartialEq)]
pub enum ProxyParseError {
    #[error("empty proxy address")]
    Empty,
    #[error("invalid proxy address {0:?}: {1}")]
    Invalid(String, String),
    #[error("proxy address {0:?} has no port")]
    MissingPort(String),
    #[error("unsupported proxy scheme {0:?}")]
    UnsupportedScheme(String),
}

/// Failure of a single outbound request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: reqwest::StatusCode },
    #[error("no fallback proxy configured for {url}")]
    NoProxy { url: String },
    #[error("failed to read proxy source {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Classify a reqwest error raised while requesting `url`.
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout { url: url.to_string() }
        } else {
            FetchError::Network {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// Failure to read or write the persisted proxy document.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("proxy document io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("proxy document is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to replace proxy document: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Why a bounded task produced no result.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("operation timed out after {} seconds", .0.as_secs_f64())]
    TimedOut(Duration),
    #[error("operation failed: {0}")]
    Failed(String),
    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// Failure of a pipeline step.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no pages could be fetched")]
    NoPages,
    #[error("html analysis produced no results")]
    NoAnalysis,
    #[error("code generation failed: {0}")]
    Generation(#[from] TaskError),
    #[error("script io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("script exceeded {} seconds", .0.as_secs())]
    ScriptTimeout(Duration),
    #[error("script reported errors: {0}")]
    Script(String),
    #[error("no scraped data to save")]
    EmptyOutput,
}

//! Error taxonomy for the extraction pipeline.
//!
//! Every failure the pipeline can produce is one of a small number of typed
//! errors. Each error knows its [`ErrorKind`] (what the caller sees) and its
//! [`Disposition`] (whether the retry controller may try again).

use std::time::Duration;
use thiserror::Error;

/// Failures raised while loading a page.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("timed out after {}ms loading {url}", after.as_millis())]
    Timeout { url: String, after: Duration },

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("access to {url} denied: {reason}")]
    Blocked { url: String, reason: String },

    #[error("invalid url {url:?}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Failures raised while locating a value inside a loaded document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no selector matched a non-empty node (tried {tried})")]
    NotFound { tried: usize },
}

/// Failures raised while turning extracted text into typed values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no number found in {0:?}")]
    NoNumber(String),

    #[error("negative price in {0:?}")]
    Negative(String),

    #[error("no percentage found in {0:?}")]
    NoPercent(String),
}

/// Any failure the pipeline can surface.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// What the caller is told went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Timeout,
    Blocked,
    NotFound,
    ParseError,
    Exhausted,
    InvalidInput,
}

/// Whether a failure may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retryable,
    Terminal,
}

impl PipelineError {
    /// Map this error onto the caller-facing taxonomy.
    ///
    /// # Returns
    /// `TIMEOUT` for timeouts and navigation failures, `BLOCKED` for denial
    /// pages, `NOT_FOUND` for selector misses, `PARSE_ERROR` for unparseable
    /// values and `INVALID_INPUT` for bad URLs, selectors or settings.
    pub fn kind(&self) -> ErrorKind {
        match self {
            // Navigation failures are network-level; callers see them as timeouts.
            PipelineError::Fetch(FetchError::Timeout { .. })
            | PipelineError::Fetch(FetchError::Navigation { .. }) => ErrorKind::Timeout,
            PipelineError::Fetch(FetchError::Blocked { .. }) => ErrorKind::Blocked,
            PipelineError::Fetch(FetchError::InvalidUrl { .. })
            | PipelineError::InvalidInput(_)
            | PipelineError::Config(_) => ErrorKind::InvalidInput,
            PipelineError::Extraction(_) => ErrorKind::NotFound,
            PipelineError::Parse(_) => ErrorKind::ParseError,
        }
    }

    /// Decide whether [`crate::retry::RetryController`] may try again.
    ///
    /// # Returns
    /// [`Disposition::Terminal`] for BLOCKED and invalid input, since another
    /// attempt cannot change the outcome. Everything else is retryable.
    pub fn disposition(&self) -> Disposition {
        match self {
            PipelineError::Fetch(FetchError::Timeout { .. })
            | PipelineError::Fetch(FetchError::Navigation { .. })
            | PipelineError::Extraction(_)
            | PipelineError::Parse(_) => Disposition::Retryable,
            PipelineError::Fetch(FetchError::Blocked { .. })
            | PipelineError::Fetch(FetchError::InvalidUrl { .. })
            | PipelineError::InvalidInput(_)
            | PipelineError::Config(_) => Disposition::Terminal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.disposition() == Disposition::Retryable
    }
}

// src/error.rs
//! Error taxonomy for a digest run.
//!
//! Per-article failures (`SummarizeError`, `BuildError`) are absorbed by the stage that
//! produced them and never become a `DigestError`. Everything wrapped in `DigestError`
//! ends the run in `Failed`.

use thiserror::Error;

/// Literature database failures. A run that hits one never touches its state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("NCBI contact email is not configured")]
    MissingContact,
    #[error("http request failed: {0}")]
    Http(String),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("malformed upstream response: {0}")]
    Malformed(String),
    #[error("request timed out")]
    Timeout,
    #[error("lookback of {0} days is outside the representable date range")]
    InvalidWindow(u32),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Http(e.to_string())
        }
    }
}

/// Failure to summarize a single article. Never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummarizeError {
    #[error("article has no abstract")]
    EmptyAbstract,
    #[error("summarizer timed out")]
    Timeout,
    #[error("summarizer request failed: {0}")]
    Http(String),
    #[error("malformed summarizer response: {0}")]
    Malformed(String),
    #[error("summarizer unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for SummarizeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SummarizeError::Timeout
        } else {
            SummarizeError::Http(e.to_string())
        }
    }
}

/// Delivery was not attempted, or every recipient failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("no recipients configured for `{0}`")]
    NoRecipients(String),
    #[error("all {attempted} recipient(s) failed; last error: {last_error}")]
    AllRecipientsFailed { attempted: usize, last_error: String },
    #[error("could not build message: {0}")]
    Message(String),
    #[error("transport unavailable: {0}")]
    Transport(String),
}

/// Raw record could not be turned into an article.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("record has no identifier")]
    MissingIdentifier,
}

/// Run-level failures. Any of these ends a run in `Failed`.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("unknown specialty `{0}`")]
    ConfigNotFound(String),
    #[error("invalid specialty configuration: {0}")]
    Config(String),
    #[error("specialty slug `{0}` is not a valid partition key")]
    InvalidSlug(String),
    #[error("persisted state for `{slug}` is corrupt: {reason}")]
    CorruptState { slug: String, reason: String },
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
    #[error("could not persist state for `{slug}`: {source}")]
    Persist {
        slug: String,
        #[source]
        source: std::io::Error,
    },
    #[error("run for `{0}` aborted unexpectedly")]
    Aborted(String),
}

impl DigestError {
    /// Short stable label, used for metrics and the run report.
    pub fn kind(&self) -> &'static str {
        match self {
            DigestError::ConfigNotFound(_) => "config_not_found",
            DigestError::Config(_) => "config",
            DigestError::InvalidSlug(_) => "invalid_slug",
            DigestError::CorruptState { .. } => "corrupt_state",
            DigestError::Fetch(_) => "fetch",
            DigestError::Delivery(_) => "delivery",
            DigestError::Persist { .. } => "persist",
            DigestError::Aborted(_) => "aborted",
        }
    }
}

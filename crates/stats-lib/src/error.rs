//! Error types for the stats collector
//!
//! Each type maps to one failure class with its own handling:
//! - [`DaemonError`]: listing, opening or reading a feed from the daemon
//! - [`DecodeError`]: a single feed record that is not a valid snapshot
//! - [`SinkError`]: the output destination failed
//! - [`PipelineError`]: failures fatal to the whole run

use thiserror::Error;

/// Errors talking to the container daemon
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("invalid daemon endpoint '{0}' (expected unix://, tcp:// or http://)")]
    InvalidEndpoint(String),

    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build daemon request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("HTTP transport error: {0}")]
    Http(#[from] hyper::Error),

    #[error("failed to read stats feed: {0}")]
    Feed(#[source] std::io::Error),

    #[error("stats record exceeds {limit} bytes without a line break")]
    RecordTooLarge { limit: usize },

    #[error("daemon returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode daemon response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A feed record that could not be decoded into a snapshot
#[derive(Debug, Error)]
#[error("malformed stats record: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Errors writing to the output sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode record: {0}")]
    Json(#[from] serde_json::Error),
}

/// An option value outside its accepted set
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {option} '{value}' (expected one of: {expected})")]
pub struct InvalidOption {
    pub option: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Errors that abort the whole collection run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("container discovery failed: {0}")]
    Discovery(#[source] DaemonError),

    #[error("output sink failed: {0}")]
    Sink(#[from] SinkError),
}

//! Error types for startup-time and artifact failures.
//!
//! Per-record, per-file and per-batch failures never surface here: they are
//! converted to tagged outcomes at the task boundary (see [`crate::upload`] and
//! [`crate::load`]). `PipelineError` covers the things that are allowed to stop
//! a run: bad configuration, an unusable schema artifact, a client that cannot
//! be constructed, or a ledger that cannot be read or written.

use crate::io::cloud::CloudIOError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error in {path}: {message}")]
    Schema { path: PathBuf, message: String },

    #[error("Failed to initialize {service} client: {message}")]
    Client { service: String, message: String },

    #[error("Ledger error for {path}: {source}")]
    Ledger {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudIOError),
}

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn schema(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn client(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Client {
            service: service.into(),
            message: message.into(),
        }
    }
}

//! Error types for ignition-rs

use thiserror::Error;

/// Main error type for ignition-rs operations
#[derive(Error, Debug)]
pub enum IgnitionError {
    #[error("unsupported source scheme: {0}")]
    SchemeUnsupported(String),

    #[error("compression is not supported with that scheme")]
    CompressionUnsupported,

    #[error("invalid compression: {0}")]
    CompressionInvalid(String),

    #[error("path is not absolute: {0}")]
    PathNotAbsolute(String),

    #[error("resource not found")]
    NotFound,

    #[error("failed to fetch resource: {0}")]
    Failed(String),

    #[error("hash mismatch: calculated {calculated}, expected {expected}")]
    HashMismatch {
        calculated: String,
        expected: String,
    },

    #[error("filesystem is not of the correct type")]
    BadFilesystem,

    #[error("unsupported filesystem format: {0:?}")]
    UnsupportedFormat(String),

    #[error("{cmd} failed with exit status {status}:\n{output}")]
    CommandFailed {
        cmd: String,
        status: i32,
        output: String,
    },

    #[error("create filesystems failed:\n{0}")]
    Filesystems(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    #[error("timeout waiting for {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl IgnitionError {
    /// Create a provider error
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    /// Create a stage error
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a generic fetch failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

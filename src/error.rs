//! Crate error type.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The virtual device rejected an operation.
    #[error("device error: {0}")]
    Device(String),

    /// The chat stream could not be read (selector gone, file missing, ...).
    #[error("stream error: {0}")]
    Stream(String),

    #[error("stream fetch timed out after {0:?}")]
    StreamTimeout(Duration),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("config error: {0}")]
    Config(String),

    /// The device worker has not published a handle yet, or has already stopped.
    #[error("device handle unavailable")]
    HandleUnavailable,

    #[error("device worker panicked")]
    WorkerPanicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn device(msg: impl Into<String>) -> Self {
        Error::Device(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Transient errors are retried on the next poll cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Stream(_) | Error::StreamTimeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

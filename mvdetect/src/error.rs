//! # Engine errors

use std::collections::TryReserveError;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or feeding the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Sensitivity image could not be opened or fully read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad image signature, undecodable image, insufficient image dimensions, or a malformed
    /// motion vector buffer.
    #[error("Format error: {0}")]
    Format(String),

    /// Grid or filter history could not be allocated.
    #[error("Allocation failure: {0}")]
    Allocation(#[from] TryReserveError),

    /// Invalid engine configuration, such as a window shorter than 12 samples.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The detection thread could not be started.
    #[error("Failed to spawn detection worker: {0}")]
    Spawn(std::io::Error),
}

impl Error {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => Self::Io(e),
            e => Self::Format(e.to_string()),
        }
    }
}

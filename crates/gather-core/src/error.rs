//! Error types for gather-core

use std::time::Duration;

use thiserror::Error;

/// Result type alias using gather-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in gather-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The remote store rejected or failed the call
    #[error("Remote store error: {0}")]
    Remote(String),

    /// The remote call did not settle within the configured bound
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    /// The target no longer exists remotely
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Failures worth retrying: the call may succeed later unchanged.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::Timeout(_) | Self::Http(_))
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

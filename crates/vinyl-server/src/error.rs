//! Server error types.

use std::net::SocketAddr;

use thiserror::Error;
use vinyl_config::ConfigError;
use vinyl_telemetry::StoreError;

/// Errors raised while building or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the server tried to bind.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error while serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The metrics store could not be opened or read.
    #[error("metrics store error: {0}")]
    Store(#[from] StoreError),

    /// The configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

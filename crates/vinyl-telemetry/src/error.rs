//! Telemetry error types.

use thiserror::Error;

/// Errors raised while setting up telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),
}

/// Errors returned by a [`MetricsStore`](crate::MetricsStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The selected backend has no implementation in this build.
    #[error("metrics backend '{backend}' is not supported")]
    Unsupported {
        /// Backend name as configured.
        backend: String,
    },

    /// The backend could not be reached.
    #[error("metrics store unavailable: {0}")]
    Unavailable(String),

    /// A snapshot could not be encoded or decoded.
    #[error("metrics serialization failed: {0}")]
    Serialization(String),
}

//! Request metrics, metrics persistence and structured logging for Vinyl.
//!
//! - **Aggregation**: [`MetricsAggregator`] keeps the process-wide request
//!   counters behind a single lock and mirrors every update to the `metrics`
//!   facade.
//! - **Persistence**: [`MetricsStore`] is the two-operation contract used to
//!   snapshot the counters; [`InMemoryMetricsStore`] is the only backend
//!   shipped with the service.
//! - **Logging**: [`init_logging`] installs a JSON or pretty `tracing`
//!   subscriber.
//!
//! # Example
//!
//! ```
//! use vinyl_telemetry::{InMemoryMetricsStore, MetricsAggregator, MetricsStore};
//!
//! let aggregator = MetricsAggregator::new();
//! aggregator.record_request_start();
//! aggregator.record_request_end(200, 12);
//!
//! let store = InMemoryMetricsStore::new();
//! store.save(&aggregator.snapshot()).unwrap();
//! assert_eq!(store.load().unwrap().total_requests, 1);
//! ```

#![warn(missing_docs)]

pub mod aggregator;
pub mod error;
pub mod logging;
pub mod store;

pub use aggregator::MetricsAggregator;
pub use error::{StoreError, TelemetryError};
pub use logging::{init_logging, LogConfig};
pub use store::{open_store, InMemoryMetricsStore, MetricsStore, StoreBackend};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

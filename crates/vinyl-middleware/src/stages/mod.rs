//! Pipeline stages.
//!
//! Stages nest in a fixed order, outermost first:
//!
//! 1. [`metrics`] - Count the request and record status and latency
//! 2. [`logging`] - Emit one structured record per request
//! 3. [`rate_limit`] - Admit or reject based on the client's recent history

pub mod logging;
pub mod metrics;
pub mod rate_limit;

pub use logging::{LoggingMiddleware, RequestLog};
pub use metrics::{MetricsMiddleware, CLIENT_CLOSED_REQUEST};
pub use rate_limit::{
    wait_hint_secs, Admission, KeyExtractor, RateLimitBuilder, RateLimitMiddleware,
    RateLimitRejection,
};

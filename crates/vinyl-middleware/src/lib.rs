//! # Vinyl Middleware
//!
//! The request pipeline of the Vinyl album service.
//!
//! Every request passes through three stages before reaching the route
//! dispatcher, always in this order:
//!
//! | Stage | Middleware | Purpose                                          |
//! |-------|------------|--------------------------------------------------|
//! | 1     | Metrics    | Count the request, record final status & latency |
//! | 2     | Logging    | Emit one structured record per request           |
//! | 3     | Rate limit | Admit or reject using the [`tracker::ClientTracker`] |
//!
//! Shared state (the client table and the metrics aggregator) is created by
//! the caller and passed in, so independent pipelines never share counters.
//!
//! ## Example
//!
//! ```
//! use vinyl_middleware::pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 3);
//! assert_eq!(stages[0].name(), "metrics");
//! assert_eq!(stages[2].name(), "rate_limit");
//! ```

#![doc(html_root_url = "https://docs.rs/vinyl-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod tracker;
pub mod types;

pub use context::MiddlewareContext;
pub use middleware::{BoxFuture, Middleware, Next};
pub use pipeline::{Pipeline, PipelineBuilder, Stage};
pub use tracker::{ClientRecord, ClientTracker, Observation, TrackerConfig};
pub use types::{Request, Response, ResponseExt};

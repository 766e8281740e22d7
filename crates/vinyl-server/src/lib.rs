//! # Vinyl Server
//!
//! HTTP server for the Vinyl album service.
//!
//! - hyper HTTP/1.1 connections on a tokio listener
//! - Album catalog routes and the `/metrics` export
//! - The metrics, logging and rate limit pipeline from `vinyl-middleware`
//! - Periodic metrics persistence and graceful shutdown
//!
//! ## Routes
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | `GET` | `/albums` | 200, every album |
//! | `POST` | `/albums` | 201, the created album; 400 on a malformed body |
//! | `GET` | `/albums/{id}` | 200, or 404 `album not found` |
//! | `GET` | `/metrics` | 200, aggregate counters |
//!
//! Other methods on these paths get 405; other paths get 404. A client over
//! its request budget gets 429 with a `Retry-After` header.

#![doc(html_root_url = "https://docs.rs/vinyl-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod catalog;
pub mod error;
pub mod handlers;
pub mod persistence;
pub mod router;
pub mod server;
pub mod shutdown;

pub use catalog::AlbumCatalog;
pub use error::{ServerError, ServerResult};
pub use handlers::AlbumService;
pub use persistence::SnapshotPersister;
pub use router::{Operation, Resolution, RouteMatch, Router};
pub use server::{Server, ServerBuilder};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

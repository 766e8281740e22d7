//! # Vinyl Core
//!
//! Core types shared by every crate in the Vinyl album service.
//!
//! This crate provides the leaf types the request pipeline is built from:
//!
//! - [`Clock`] - Time source injected into time-sensitive components
//! - [`RequestId`] - UUID v7 request identifier
//! - [`MetricsSnapshot`] - Point-in-time copy of the aggregated counters
//! - [`Album`] - Catalog entry served by the album routes

#![doc(html_root_url = "https://docs.rs/vinyl-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod album;
mod clock;
mod context;
mod snapshot;

pub use album::{Album, NewAlbum};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::RequestId;
pub use snapshot::{MetricsExport, MetricsSnapshot};

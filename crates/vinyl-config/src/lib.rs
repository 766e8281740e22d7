//! Typed configuration for the Vinyl album service.
//!
//! Configuration is loaded in layers: built-in defaults, then an optional
//! TOML or JSON file, then environment variables. Unknown fields in files are
//! rejected.
//!
//! # Example
//!
//! ```no_run
//! use vinyl_config::ConfigLoader;
//!
//! # fn main() -> Result<(), vinyl_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()?
//!     .with_optional_file("vinyl.toml")?
//!     .with_env_prefix("VINYL")
//!     .load()?;
//!
//! println!("listening on {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # File format
//!
//! ```toml
//! [server]
//! http_addr = "127.0.0.1:8080"
//! shutdown_timeout_secs = 30
//! request_timeout_ms = 30000
//!
//! [rate_limit]
//! enabled = true
//! window_secs = 15
//! threshold = 5
//! key = "peer_ip"
//! max_clients = 100000
//!
//! [metrics]
//! backend = "memory"
//! snapshot_interval_secs = 60
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment overrides
//!
//! Variables follow `PREFIX__SECTION__KEY`:
//! - `VINYL__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `VINYL__RATE_LIMIT__THRESHOLD=10`
//! - `VINYL__METRICS__SNAPSHOT_INTERVAL_SECS=0`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::VinylConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::*;

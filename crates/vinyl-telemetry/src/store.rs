//! Metrics persistence.
//!
//! A [`MetricsStore`] saves and loads whole [`MetricsSnapshot`]s. The backend
//! is chosen once at startup through [`StoreBackend`] and [`open_store`].
//! Only the in-memory backend ships with the service; relational, document and
//! key-value storage are separate integrations, and selecting one of them
//! fails with [`StoreError::Unsupported`] instead of running a placeholder.

use crate::error::StoreError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use vinyl_core::MetricsSnapshot;

/// Persistence contract for aggregated metrics.
///
/// Implementations must apply `save` atomically: either the new snapshot
/// replaces the old one entirely, or the previously persisted snapshot is
/// left untouched and an error is returned.
pub trait MetricsStore: Send + Sync + fmt::Debug {
    /// Persists `snapshot`, overwriting any previously saved one.
    fn save(&self, snapshot: &MetricsSnapshot) -> Result<(), StoreError>;

    /// Returns the most recently saved snapshot, or a zeroed one if nothing
    /// was saved yet.
    fn load(&self) -> Result<MetricsSnapshot, StoreError>;
}

/// Keeps the last saved snapshot in process memory.
#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    saved: RwLock<Option<MetricsSnapshot>>,
}

impl InMemoryMetricsStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsStore for InMemoryMetricsStore {
    fn save(&self, snapshot: &MetricsSnapshot) -> Result<(), StoreError> {
        *self.saved.write() = Some(*snapshot);
        Ok(())
    }

    fn load(&self) -> Result<MetricsSnapshot, StoreError> {
        Ok((*self.saved.read()).unwrap_or_default())
    }
}

/// Storage backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process memory (default).
    #[default]
    Memory,
    /// SQL database such as PostgreSQL or SQLite.
    #[serde(alias = "postgres", alias = "sqlite")]
    Relational,
    /// Document database such as MongoDB.
    #[serde(alias = "mongodb")]
    Document,
    /// Key-value store such as DynamoDB.
    #[serde(alias = "dynamodb", alias = "key-value")]
    KeyValue,
}

impl StoreBackend {
    /// Canonical configuration name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Relational => "relational",
            Self::Document => "document",
            Self::KeyValue => "key_value",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreBackend {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "memory" => Ok(Self::Memory),
            "relational" | "postgres" | "sqlite" => Ok(Self::Relational),
            "document" | "mongodb" => Ok(Self::Document),
            "key_value" | "key-value" | "dynamodb" => Ok(Self::KeyValue),
            other => Err(StoreError::Unsupported {
                backend: other.to_string(),
            }),
        }
    }
}

/// Opens the store for `backend`.
///
/// # Errors
///
/// Returns [`StoreError::Unsupported`] for every backend other than
/// [`StoreBackend::Memory`].
pub fn open_store(backend: StoreBackend) -> Result<Arc<dyn MetricsStore>, StoreError> {
    match backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryMetricsStore::new())),
        other => Err(StoreError::Unsupported {
            backend: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: 12,
            total_errors: 3,
            total_rate_limited: 2,
            total_albums_fetched: 5,
            total_albums_added: 1,
            total_latency_millis: 240,
        }
    }

    #[test]
    fn test_load_before_save_is_zeroed() {
        let store = InMemoryMetricsStore::new();
        assert_eq!(store.load().unwrap(), MetricsSnapshot::default());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let store = InMemoryMetricsStore::new();
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());
    }

    #[test]
    fn test_save_overwrites() {
        let store = InMemoryMetricsStore::new();
        store.save(&sample()).unwrap();
        let newer = MetricsSnapshot {
            total_requests: 13,
            ..sample()
        };
        store.save(&newer).unwrap();
        assert_eq!(store.load().unwrap(), newer);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!("Postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Relational);
        assert_eq!("sqlite".parse::<StoreBackend>().unwrap(), StoreBackend::Relational);
        assert_eq!("mongodb".parse::<StoreBackend>().unwrap(), StoreBackend::Document);
        assert_eq!("dynamodb".parse::<StoreBackend>().unwrap(), StoreBackend::KeyValue);
        assert_eq!("key-value".parse::<StoreBackend>().unwrap(), StoreBackend::KeyValue);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_backend_deserialize_aliases() {
        let backend: StoreBackend = serde_json::from_str("\"key_value\"").unwrap();
        assert_eq!(backend, StoreBackend::KeyValue);
        let backend: StoreBackend = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(backend, StoreBackend::Relational);
    }

    #[test]
    fn test_open_store_memory() {
        let store = open_store(StoreBackend::Memory).unwrap();
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());
    }

    #[test]
    fn test_open_store_rejects_external_backends() {
        for backend in [StoreBackend::Relational, StoreBackend::Document, StoreBackend::KeyValue] {
            let err = open_store(backend).unwrap_err();
            assert_eq!(
                err,
                StoreError::Unsupported {
                    backend: backend.to_string()
                }
            );
        }
    }
}

//! Per-client request history for rate limiting.
//!
//! [`ClientTracker`] maps a client identity to its [`ClientRecord`]. A record
//! counts the requests seen since the current window opened; a gap of at
//! least one window between two requests starts a new window.
//!
//! The table is bounded. Records idle for longer than
//! [`TrackerConfig::idle_ttl`] are swept periodically, and when a new
//! identity arrives at [`TrackerConfig::max_clients`] the least recently seen
//! record is evicted. `idle_ttl` is never shorter than the window, so a
//! reclaimed record is one whose next request would have opened a fresh
//! window anyway.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default rate-limit window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15);

/// Default bound on tracked identities.
pub const DEFAULT_MAX_CLIENTS: usize = 100_000;

/// Client tracker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Gap after which a client's count starts over.
    pub window: Duration,
    /// Maximum number of identities kept in the table.
    pub max_clients: usize,
    /// Idle time after which a record may be reclaimed.
    pub idle_ttl: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl TrackerConfig {
    /// Creates a configuration for `window`, reclaiming records after one idle window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            max_clients: DEFAULT_MAX_CLIENTS,
            idle_ttl: window,
        }
    }

    /// Sets the table bound. Zero is treated as one.
    #[must_use]
    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients.max(1);
        self
    }

    /// Sets the idle TTL. Values shorter than the window are raised to the window.
    #[must_use]
    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl.max(self.window);
        self
    }
}

/// Request history for one client identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRecord {
    /// Time of the most recent request.
    pub last_request: Instant,
    /// Requests seen in the current window, including the most recent one.
    pub request_count: u64,
}

/// Result of [`ClientTracker::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Request count for the identity after this request.
    pub count: u64,
    /// Whether this request opened a new window.
    pub is_new_window: bool,
}

#[derive(Debug, Default)]
struct TrackerState {
    records: HashMap<String, ClientRecord>,
    last_sweep: Option<Instant>,
}

/// Identity to [`ClientRecord`] table shared by all in-flight requests.
#[derive(Debug)]
pub struct ClientTracker {
    config: TrackerConfig,
    state: Mutex<TrackerState>,
    evictions: AtomicU64,
}

impl Default for ClientTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl ClientTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        let config = TrackerConfig {
            max_clients: config.max_clients.max(1),
            idle_ttl: config.idle_ttl.max(config.window),
            ..config
        };
        Self {
            config,
            state: Mutex::new(TrackerState::default()),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the effective configuration.
    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Records a request from `identity` at `now`.
    ///
    /// The lookup, update and `last_request = now` assignment happen under
    /// one lock, so concurrent requests from the same identity are counted
    /// exactly once each.
    pub fn observe(&self, identity: &str, now: Instant) -> Observation {
        let mut state = self.state.lock();
        self.sweep_if_due(&mut state, now);

        if let Some(record) = state.records.get_mut(identity) {
            let gap = now.saturating_duration_since(record.last_request);
            let observation = if gap < self.config.window {
                record.request_count = record.request_count.saturating_add(1);
                Observation {
                    count: record.request_count,
                    is_new_window: false,
                }
            } else {
                record.request_count = 1;
                Observation {
                    count: 1,
                    is_new_window: true,
                }
            };
            record.last_request = now;
            return observation;
        }

        if state.records.len() >= self.config.max_clients {
            self.evict_expired(&mut state.records, now);
        }
        while state.records.len() >= self.config.max_clients {
            let Some(oldest) = Self::find_oldest(&state.records) else {
                break;
            };
            state.records.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        state.records.insert(
            identity.to_string(),
            ClientRecord {
                last_request: now,
                request_count: 1,
            },
        );
        Observation {
            count: 1,
            is_new_window: true,
        }
    }

    /// Removes every record idle for at least the idle TTL.
    ///
    /// Returns the number of records removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        state.last_sweep = Some(now);
        self.evict_expired(&mut state.records, now)
    }

    /// Returns the record for `identity`, if tracked.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<ClientRecord> {
        self.state.lock().records.get(identity).copied()
    }

    /// Number of tracked identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Returns true if no identity is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of records reclaimed since construction.
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn sweep_if_due(&self, state: &mut TrackerState, now: Instant) {
        match state.last_sweep {
            None => state.last_sweep = Some(now),
            Some(last) if now.saturating_duration_since(last) >= self.config.idle_ttl => {
                state.last_sweep = Some(now);
                self.evict_expired(&mut state.records, now);
            }
            Some(_) => {}
        }
    }

    fn evict_expired(&self, records: &mut HashMap<String, ClientRecord>, now: Instant) -> usize {
        let ttl = self.config.idle_ttl;
        let before = records.len();
        records.retain(|_, record| now.saturating_duration_since(record.last_request) < ttl);
        let removed = before - records.len();
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    fn find_oldest(records: &HashMap<String, ClientRecord>) -> Option<String> {
        records
            .iter()
            .min_by_key(|(_, record)| record.last_request)
            .map(|(identity, _)| identity.clone())
    }
}

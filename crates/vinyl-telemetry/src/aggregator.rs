//! Process-wide request counters.
//!
//! [`MetricsAggregator`] owns the single [`MetricsSnapshot`] the service
//! exports. It is constructed once at startup and handed to the pipeline and
//! the route handlers explicitly; there is no global instance.
//!
//! Every update is also forwarded to the `metrics` facade so an installed
//! recorder sees the same counts:
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `vinyl_requests_total` | Counter | - | Requests entering the pipeline |
//! | `vinyl_request_errors_total` | Counter | `status` | Responses with status >= 400 |
//! | `vinyl_rate_limited_total` | Counter | - | Requests rejected by the rate limiter |
//! | `vinyl_albums_fetched_total` | Counter | - | Album list operations |
//! | `vinyl_albums_added_total` | Counter | - | Album create operations |
//! | `vinyl_request_duration_seconds` | Histogram | - | Request latency |
//! | `vinyl_in_flight_requests` | Gauge | - | Requests currently being processed |

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use parking_lot::Mutex;
use std::sync::Once;
use vinyl_core::MetricsSnapshot;

static DESCRIBE: Once = Once::new();

/// Aggregates request outcomes into a [`MetricsSnapshot`].
///
/// All counters live behind one lock so [`snapshot`](Self::snapshot) always
/// returns a mutually consistent copy.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    state: Mutex<MetricsSnapshot>,
}

impl MetricsAggregator {
    /// Creates an aggregator with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        DESCRIBE.call_once(register_metric_descriptions);
        Self::default()
    }

    /// Creates an aggregator seeded from a previously persisted snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: MetricsSnapshot) -> Self {
        let aggregator = Self::new();
        *aggregator.state.lock() = snapshot;
        aggregator
    }

    /// Counts a request on entry, before it is dispatched.
    pub fn record_request_start(&self) {
        {
            let mut state = self.state.lock();
            state.total_requests = state.total_requests.saturating_add(1);
        }
        counter!("vinyl_requests_total").increment(1);
        gauge!("vinyl_in_flight_requests").increment(1.0);
    }

    /// Records the outcome of a request previously counted by
    /// [`record_request_start`](Self::record_request_start).
    pub fn record_request_end(&self, status_code: u16, duration_millis: u64) {
        let is_error = status_code >= 400;
        {
            let mut state = self.state.lock();
            state.total_latency_millis = state.total_latency_millis.saturating_add(duration_millis);
            if is_error {
                state.total_errors = state.total_errors.saturating_add(1);
            }
        }

        gauge!("vinyl_in_flight_requests").decrement(1.0);
        histogram!("vinyl_request_duration_seconds").record(duration_millis as f64 / 1000.0);
        if is_error {
            counter!("vinyl_request_errors_total", "status" => status_code.to_string()).increment(1);
        }
    }

    /// Counts a rate-limit rejection.
    pub fn record_rate_limited(&self) {
        {
            let mut state = self.state.lock();
            state.total_rate_limited = state.total_rate_limited.saturating_add(1);
        }
        counter!("vinyl_rate_limited_total").increment(1);
    }

    /// Counts a successful album list operation.
    pub fn record_albums_fetched(&self) {
        {
            let mut state = self.state.lock();
            state.total_albums_fetched = state.total_albums_fetched.saturating_add(1);
        }
        counter!("vinyl_albums_fetched_total").increment(1);
    }

    /// Counts a successful album create operation.
    pub fn record_album_added(&self) {
        {
            let mut state = self.state.lock();
            state.total_albums_added = state.total_albums_added.saturating_add(1);
        }
        counter!("vinyl_albums_added_total").increment(1);
    }

    /// Returns a consistent point-in-time copy of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        *self.state.lock()
    }
}

fn register_metric_descriptions() {
    describe_counter!(
        "vinyl_requests_total",
        "Total number of HTTP requests entering the pipeline"
    );
    describe_counter!(
        "vinyl_request_errors_total",
        "Total number of HTTP responses with status >= 400"
    );
    describe_counter!(
        "vinyl_rate_limited_total",
        "Total number of requests rejected by the rate limiter"
    );
    describe_counter!("vinyl_albums_fetched_total", "Total album list operations");
    describe_counter!("vinyl_albums_added_total", "Total album create operations");
    describe_histogram!(
        "vinyl_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        "vinyl_in_flight_requests",
        "Number of HTTP requests currently being processed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_new_aggregator_is_zeroed() {
        let aggregator = MetricsAggregator::new();
        assert_eq!(aggregator.snapshot(), MetricsSnapshot::default());
        assert_eq!(aggregator.snapshot().average_latency_millis(), 0);
    }

    #[test]
    fn test_request_lifecycle() {
        let aggregator = MetricsAggregator::new();

        aggregator.record_request_start();
        aggregator.record_request_end(200, 30);
        aggregator.record_request_start();
        aggregator.record_request_end(404, 10);

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.total_errors, 1);
        assert_eq!(snapshot.total_latency_millis, 40);
        assert_eq!(snapshot.average_latency_millis(), 20);
    }

    #[test]
    fn test_status_399_is_not_an_error() {
        let aggregator = MetricsAggregator::new();
        aggregator.record_request_start();
        aggregator.record_request_end(399, 1);
        assert_eq!(aggregator.snapshot().total_errors, 0);
    }

    #[test]
    fn test_route_counters() {
        let aggregator = MetricsAggregator::new();
        aggregator.record_albums_fetched();
        aggregator.record_albums_fetched();
        aggregator.record_album_added();
        aggregator.record_rate_limited();

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.total_albums_fetched, 2);
        assert_eq!(snapshot.total_albums_added, 1);
        assert_eq!(snapshot.total_rate_limited, 1);
    }

    #[test]
    fn test_from_snapshot_continues_counting() {
        let restored = MetricsSnapshot {
            total_requests: 10,
            total_latency_millis: 100,
            ..MetricsSnapshot::default()
        };
        let aggregator = MetricsAggregator::from_snapshot(restored);
        aggregator.record_request_start();
        aggregator.record_request_end(200, 10);

        assert_eq!(aggregator.snapshot().total_requests, 11);
        assert_eq!(aggregator.snapshot().average_latency_millis(), 10);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let aggregator = Arc::new(MetricsAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let aggregator = Arc::clone(&aggregator);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        aggregator.record_request_start();
                        aggregator.record_request_end(500, 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.total_requests, 8_000);
        assert_eq!(snapshot.total_errors, 8_000);
        assert_eq!(snapshot.total_latency_millis, 8_000);
    }

    #[derive(Debug, Clone)]
    enum Outcome {
        Served { status: u16, millis: u64 },
        RateLimited { millis: u64 },
    }

    fn outcome() -> impl Strategy<Value = Outcome> {
        prop_oneof![
            (100u16..600, 0u64..10_000).prop_map(|(status, millis)| Outcome::Served { status, millis }),
            (0u64..10).prop_map(|millis| Outcome::RateLimited { millis }),
        ]
    }

    proptest! {
        #[test]
        fn counters_stay_bounded_by_total_requests(outcomes in prop::collection::vec(outcome(), 0..200)) {
            let aggregator = MetricsAggregator::new();
            let mut latency = 0u64;

            for outcome in &outcomes {
                aggregator.record_request_start();
                match *outcome {
                    Outcome::Served { status, millis } => {
                        aggregator.record_request_end(status, millis);
                        latency += millis;
                    }
                    Outcome::RateLimited { millis } => {
                        aggregator.record_rate_limited();
                        aggregator.record_request_end(429, millis);
                        latency += millis;
                    }
                }
            }

            let snapshot = aggregator.snapshot();
            prop_assert_eq!(snapshot.total_requests, outcomes.len() as u64);
            prop_assert!(snapshot.total_errors <= snapshot.total_requests);
            prop_assert!(snapshot.total_rate_limited <= snapshot.total_requests);
            prop_assert_eq!(snapshot.total_latency_millis, latency);
            let expected = if outcomes.is_empty() { 0 } else { latency / outcomes.len() as u64 };
            prop_assert_eq!(snapshot.average_latency_millis(), expected);
        }
    }
}

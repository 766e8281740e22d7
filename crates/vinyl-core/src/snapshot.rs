//! Aggregated request metrics.

use serde::{Deserialize, Serialize};

/// Point-in-time copy of the process-wide request counters.
///
/// Every field is a non-negative running total. `total_errors` and
/// `total_rate_limited` never exceed `total_requests` when the snapshot was
/// produced by the aggregator, because both are only bumped for requests that
/// were already counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsSnapshot {
    /// Requests that entered the pipeline, admitted or not.
    pub total_requests: u64,
    /// Requests that completed with a status code of 400 or above.
    pub total_errors: u64,
    /// Requests rejected by the rate limiter.
    pub total_rate_limited: u64,
    /// Successful album list operations.
    pub total_albums_fetched: u64,
    /// Successful album create operations.
    pub total_albums_added: u64,
    /// Sum of all observed request durations, in milliseconds.
    pub total_latency_millis: u64,
}

impl MetricsSnapshot {
    /// Mean request latency in whole milliseconds, `0` before the first request.
    #[must_use]
    pub fn average_latency_millis(&self) -> u64 {
        self.total_latency_millis
            .checked_div(self.total_requests)
            .unwrap_or(0)
    }

    /// Returns the body served by the metrics export route.
    #[must_use]
    pub fn export(&self) -> MetricsExport {
        MetricsExport {
            total_requests: self.total_requests,
            total_errors: self.total_errors,
            total_albums_fetched: self.total_albums_fetched,
            total_albums_added: self.total_albums_added,
            total_rate_limited: self.total_rate_limited,
            average_latency_millis: self.average_latency_millis(),
        }
    }
}

/// Wire shape of `GET /metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct MetricsExport {
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_albums_fetched: u64,
    pub total_albums_added: u64,
    pub total_rate_limited: u64,
    pub average_latency_millis: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_average_latency_is_zero_without_requests() {
        let snapshot = MetricsSnapshot {
            total_latency_millis: 500,
            ..MetricsSnapshot::default()
        };
        assert_eq!(snapshot.average_latency_millis(), 0);
    }

    #[test]
    fn test_average_latency_truncates() {
        let snapshot = MetricsSnapshot {
            total_requests: 3,
            total_latency_millis: 10,
            ..MetricsSnapshot::default()
        };
        assert_eq!(snapshot.average_latency_millis(), 3);
    }

    #[test]
    fn test_export_uses_camel_case_integers() {
        let snapshot = MetricsSnapshot {
            total_requests: 4,
            total_errors: 1,
            total_rate_limited: 1,
            total_albums_fetched: 2,
            total_albums_added: 1,
            total_latency_millis: 40,
        };

        let value = serde_json::to_value(snapshot.export()).unwrap();

        assert_eq!(value["totalRequests"], 4);
        assert_eq!(value["totalErrors"], 1);
        assert_eq!(value["totalAlbumsFetched"], 2);
        assert_eq!(value["totalAlbumsAdded"], 1);
        assert_eq!(value["totalRateLimited"], 1);
        assert_eq!(value["averageLatencyMillis"], 10);
        assert!(value.get("totalLatencyMillis").is_none());
    }

    #[test]
    fn test_snapshot_deserializes_missing_fields_as_zero() {
        let snapshot: MetricsSnapshot = serde_json::from_str(r#"{"totalRequests": 7}"#).unwrap();
        assert_eq!(snapshot.total_requests, 7);
        assert_eq!(snapshot.total_errors, 0);
    }

    proptest! {
        #[test]
        fn average_latency_matches_integer_division(
            requests in 0u64..1_000_000,
            latency in 0u64..u64::MAX / 2,
        ) {
            let snapshot = MetricsSnapshot {
                total_requests: requests,
                total_latency_millis: latency,
                ..MetricsSnapshot::default()
            };
            let expected = if requests == 0 { 0 } else { latency / requests };
            prop_assert_eq!(snapshot.average_latency_millis(), expected);
        }
    }
}

//! Request metrics middleware.
//!
//! Outermost stage: every request is counted on entry, before the rate
//! limiter can reject it, and its final status and duration are recorded on
//! the way out. A request whose future is dropped before it produces a
//! response (the client went away) is recorded with status
//! [`CLIENT_CLOSED_REQUEST`].

use crate::{
    context::MiddlewareContext,
    middleware::{BoxFuture, Middleware, Next},
    types::{Request, Response},
};
use std::sync::Arc;
use std::time::Instant;
use vinyl_core::{Clock, SystemClock};
use vinyl_telemetry::MetricsAggregator;

/// Status recorded for requests abandoned before a response was produced.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Counts requests and latency on a shared [`MetricsAggregator`].
#[derive(Debug, Clone)]
pub struct MetricsMiddleware {
    aggregator: Arc<MetricsAggregator>,
    clock: Arc<dyn Clock>,
}

impl MetricsMiddleware {
    /// Creates a metrics stage recording on `aggregator`.
    #[must_use]
    pub fn new(aggregator: Arc<MetricsAggregator>) -> Self {
        Self {
            aggregator,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the aggregator this stage records on.
    #[must_use]
    pub fn aggregator(&self) -> &Arc<MetricsAggregator> {
        &self.aggregator
    }
}

impl Middleware for MetricsMiddleware {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            self.aggregator.record_request_start();
            let mut in_flight = InFlight {
                aggregator: &self.aggregator,
                clock: self.clock.as_ref(),
                start: self.clock.now(),
                status: CLIENT_CLOSED_REQUEST,
            };

            let response = next.run(ctx, request).await;

            in_flight.status = response.status().as_u16();
            drop(in_flight);
            response
        })
    }
}

/// Records the end of a request when dropped, whether or not it completed.
struct InFlight<'a> {
    aggregator: &'a MetricsAggregator,
    clock: &'a dyn Clock,
    start: Instant,
    status: u16,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let elapsed = self.clock.now().saturating_duration_since(self.start);
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.aggregator.record_request_end(self.status, millis);
    }
}

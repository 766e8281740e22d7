//! Rate limiting middleware.
//!
//! Admission is decided per client identity using a [`ClientTracker`]. Once a
//! client has sent more than `threshold` requests without a full window of
//! quiet in between, each further request is rejected with
//! `429 Too Many Requests` and an advisory wait hint of `2^count` seconds,
//! where `count` is the client's running request count.
//!
//! The hint grows very quickly (64s on the 6th request, over 9 hours by the
//! 15th). It is kept for wire compatibility with existing clients; it is
//! reported, never enforced.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vinyl_middleware::stages::{KeyExtractor, RateLimitMiddleware};
//! use vinyl_telemetry::MetricsAggregator;
//!
//! let rate_limit = RateLimitMiddleware::builder(Arc::new(MetricsAggregator::new()))
//!     .threshold(5)
//!     .window(Duration::from_secs(15))
//!     .key_extractor(KeyExtractor::PeerIp)
//!     .build();
//! ```

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::tracker::{ClientTracker, TrackerConfig, DEFAULT_WINDOW};
use crate::types::{Request, Response, ResponseExt};
use http::{HeaderValue, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use vinyl_core::{Clock, SystemClock};
use vinyl_telemetry::MetricsAggregator;

/// Rate limit header names.
pub mod headers {
    /// Seconds to wait before retrying (on 429).
    pub const RETRY_AFTER: &str = "retry-after";
    /// Client-supplied forwarding chain.
    pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
}

/// Body message of every rejection.
pub const REJECTION_MESSAGE: &str = "Too many requests, please wait a bit";

/// Default number of requests admitted per window.
pub const DEFAULT_THRESHOLD: u64 = 5;

/// Identity used when none can be derived from the request.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// How to derive the client identity from a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyExtractor {
    /// IP address of the TCP peer.
    #[default]
    PeerIp,
    /// First `X-Forwarded-For` entry, falling back to the peer IP.
    ///
    /// Only appropriate behind a proxy that overwrites the header.
    ForwardedFor,
    /// One shared identity for every request.
    Global,
}

impl KeyExtractor {
    /// Extracts the identity for `request`.
    pub fn extract(&self, request: &Request, ctx: &MiddlewareContext) -> String {
        let key = match self {
            Self::PeerIp => ctx.peer_ip(),
            Self::ForwardedFor => request
                .headers()
                .get(headers::X_FORWARDED_FOR)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(String::from)
                .or_else(|| ctx.peer_ip()),
            Self::Global => Some("global".to_string()),
        };
        key.unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed.
    Admitted {
        /// Client's request count in the current window.
        count: u64,
    },
    /// The request is refused.
    Rejected {
        /// Client's request count in the current window.
        count: u64,
        /// Advisory delay before retrying, in seconds.
        wait_hint_secs: u64,
    },
}

impl Admission {
    /// Returns true if the request may proceed.
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}

/// Stored in the context when a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRejection {
    /// Client's request count when rejected.
    pub count: u64,
    /// Advisory delay in seconds.
    pub wait_hint_secs: u64,
}

/// Returns `2^count`, saturating at `u64::MAX`.
#[must_use]
pub fn wait_hint_secs(count: u64) -> u64 {
    u32::try_from(count)
        .ok()
        .and_then(|exp| 1u64.checked_shl(exp))
        .unwrap_or(u64::MAX)
}

/// Rate limiting middleware.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    tracker: Arc<ClientTracker>,
    threshold: u64,
    key_extractor: KeyExtractor,
    aggregator: Arc<MetricsAggregator>,
    clock: Arc<dyn Clock>,
}

/// Builder for [`RateLimitMiddleware`].
#[derive(Debug, Clone)]
pub struct RateLimitBuilder {
    tracker: TrackerConfig,
    threshold: u64,
    key_extractor: KeyExtractor,
    aggregator: Arc<MetricsAggregator>,
    clock: Arc<dyn Clock>,
}

impl RateLimitBuilder {
    /// Sets the number of requests admitted per window.
    ///
    /// Default: 5 requests.
    #[must_use]
    pub fn threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the window.
    ///
    /// Default: 15 seconds.
    #[must_use]
    pub fn window(mut self, window: Duration) -> Self {
        self.tracker = TrackerConfig {
            window,
            ..self.tracker
        }
        .with_idle_ttl(self.tracker.idle_ttl);
        self
    }

    /// Sets the bound on tracked identities.
    #[must_use]
    pub fn max_clients(mut self, max_clients: usize) -> Self {
        self.tracker = self.tracker.with_max_clients(max_clients);
        self
    }

    /// Sets how long an idle identity is remembered.
    #[must_use]
    pub fn idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.tracker = self.tracker.with_idle_ttl(idle_ttl);
        self
    }

    /// Sets how the client identity is derived.
    #[must_use]
    pub fn key_extractor(mut self, key_extractor: KeyExtractor) -> Self {
        self.key_extractor = key_extractor;
        self
    }

    /// Sets the time source.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the rate limit middleware.
    #[must_use]
    pub fn build(self) -> RateLimitMiddleware {
        RateLimitMiddleware {
            tracker: Arc::new(ClientTracker::new(self.tracker)),
            threshold: self.threshold,
            key_extractor: self.key_extractor,
            aggregator: self.aggregator,
            clock: self.clock,
        }
    }
}

impl RateLimitMiddleware {
    /// Creates a builder; rejections are counted on `aggregator`.
    #[must_use]
    pub fn builder(aggregator: Arc<MetricsAggregator>) -> RateLimitBuilder {
        RateLimitBuilder {
            tracker: TrackerConfig::new(DEFAULT_WINDOW),
            threshold: DEFAULT_THRESHOLD,
            key_extractor: KeyExtractor::default(),
            aggregator,
            clock: Arc::new(SystemClock),
        }
    }

    /// Returns the client tracker.
    #[must_use]
    pub fn tracker(&self) -> &Arc<ClientTracker> {
        &self.tracker
    }

    /// Returns the admission threshold.
    #[must_use]
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Decides whether a request from `identity` at `now` is admitted.
    ///
    /// Rejections are counted on the aggregator.
    pub fn check(&self, identity: &str, now: Instant) -> Admission {
        let observation = self.tracker.observe(identity, now);

        if observation.count > self.threshold && !observation.is_new_window {
            self.aggregator.record_rate_limited();
            Admission::Rejected {
                count: observation.count,
                wait_hint_secs: wait_hint_secs(observation.count),
            }
        } else {
            Admission::Admitted {
                count: observation.count,
            }
        }
    }

    fn rejection_response(wait_hint_secs: u64) -> Response {
        let mut response = Response::message(StatusCode::TOO_MANY_REQUESTS, REJECTION_MESSAGE);
        response
            .headers_mut()
            .insert(headers::RETRY_AFTER, HeaderValue::from(wait_hint_secs));
        response
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let identity = self.key_extractor.extract(&request, ctx);
            let admission = self.check(&identity, self.clock.now());

            match admission {
                Admission::Admitted { .. } => {
                    ctx.set_client(identity);
                    next.run(ctx, request).await
                }
                Admission::Rejected {
                    count,
                    wait_hint_secs,
                } => {
                    tracing::warn!(
                        client = %identity,
                        request_count = count,
                        retry_after_secs = wait_hint_secs,
                        "Rate limit exceeded"
                    );
                    ctx.set_client(identity);
                    ctx.set_extension(RateLimitRejection {
                        count,
                        wait_hint_secs,
                    });
                    Self::rejection_response(wait_hint_secs)
                }
            }
        })
    }
}

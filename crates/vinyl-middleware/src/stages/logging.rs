//! Request logging middleware.
//!
//! Emits exactly one `info` record per request once the inner stages have
//! produced a response, including requests rejected by the rate limiter.
//! The record is also stored in the context as a [`RequestLog`] extension.
//!
//! Fields: `request_id`, `client`, `http.method`, `http.path`,
//! `http.status_code`, `duration_ms`, plus `retry_after_secs` for rejected
//! requests.

use crate::{
    context::MiddlewareContext,
    middleware::{BoxFuture, Middleware, Next},
    stages::rate_limit::{RateLimitRejection, UNKNOWN_CLIENT},
    types::{Request, Response},
};
use std::sync::Arc;
use vinyl_core::{Clock, SystemClock};

/// Summary of one handled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLog {
    /// The request ID.
    pub request_id: String,
    /// Client identity, or the peer IP when the rate limiter did not run.
    pub client: String,
    /// The HTTP method.
    pub method: String,
    /// The request path.
    pub path: String,
    /// The final HTTP status code.
    pub status_code: u16,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Wait hint, if the request was rate limited.
    pub retry_after_secs: Option<u64>,
}

/// Logs one structured record per request.
#[derive(Debug, Clone)]
pub struct LoggingMiddleware {
    clock: Arc<dyn Clock>,
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingMiddleware {
    /// Creates a logging stage using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn emit(log: &RequestLog) {
        match log.retry_after_secs {
            Some(retry_after_secs) => tracing::info!(
                request_id = %log.request_id,
                client = %log.client,
                http.method = %log.method,
                http.path = %log.path,
                http.status_code = log.status_code,
                duration_ms = log.duration_ms,
                retry_after_secs,
                "Request completed"
            ),
            None => tracing::info!(
                request_id = %log.request_id,
                client = %log.client,
                http.method = %log.method,
                http.path = %log.path,
                http.status_code = log.status_code,
                duration_ms = log.duration_ms,
                "Request completed"
            ),
        }
    }
}

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let start = self.clock.now();
            let method = request.method().to_string();
            let path = request.uri().path().to_string();

            let response = next.run(ctx, request).await;

            let elapsed = self.clock.now().saturating_duration_since(start);
            let client = ctx
                .client()
                .map(String::from)
                .or_else(|| ctx.peer_ip())
                .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

            let log = RequestLog {
                request_id: ctx.request_id().to_string(),
                client,
                method,
                path,
                status_code: response.status().as_u16(),
                duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                retry_after_secs: ctx
                    .get_extension::<RateLimitRejection>()
                    .map(|rejection| rejection.wait_hint_secs),
            };
            Self::emit(&log);
            ctx.set_extension(log);

            response
        })
    }
}

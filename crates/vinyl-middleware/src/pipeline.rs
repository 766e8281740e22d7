//! Fixed-order middleware pipeline.
//!
//! The composer nests the stages around the route dispatcher in [`Stage`]
//! order, regardless of the order the builder was called in:
//!
//! ```text
//! Request → Metrics → Logging → RateLimit → Dispatcher
//!                                               ↓
//! Response ← Metrics ← Logging ← RateLimit ←────┘
//! ```
//!
//! Metrics and logging wrap the rate limiter, so rejected requests are still
//! counted and logged; only admitted requests reach the dispatcher. A stage
//! that was not configured is skipped.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::stages::{LoggingMiddleware, MetricsMiddleware, RateLimitMiddleware};
use crate::types::{Request, Response};
use std::sync::Arc;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Pipeline stage position, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Stage 1: Request metrics
    Metrics = 1,
    /// Stage 2: Request logging
    Logging = 2,
    /// Stage 3: Rate limiting
    RateLimit = 3,
}

impl Stage {
    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::Logging => "logging",
            Self::RateLimit => "rate_limit",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Stage; 3] {
        [Self::Metrics, Self::Logging, Self::RateLimit]
    }
}

/// The composed request handler.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use vinyl_middleware::pipeline::Pipeline;
/// use vinyl_middleware::stages::{LoggingMiddleware, MetricsMiddleware, RateLimitMiddleware};
/// use vinyl_telemetry::MetricsAggregator;
///
/// let aggregator = Arc::new(MetricsAggregator::new());
/// let pipeline = Pipeline::builder()
///     .rate_limit(RateLimitMiddleware::builder(Arc::clone(&aggregator)).build())
///     .logging(LoggingMiddleware::new())
///     .metrics(MetricsMiddleware::new(aggregator))
///     .build();
///
/// assert_eq!(pipeline.stage_names(), vec!["metrics", "logging", "rate_limit"]);
/// ```
pub struct Pipeline {
    stages: Vec<(Stage, BoxedMiddleware)>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Processes one request through every stage and then `dispatcher`.
    pub async fn process<H>(
        &self,
        mut ctx: MiddlewareContext,
        request: Request,
        dispatcher: H,
    ) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
    {
        self.process_with_context(&mut ctx, request, dispatcher).await
    }

    /// Like [`process`](Self::process), leaving the context with the caller
    /// so extensions set by the stages can be inspected afterwards.
    pub async fn process_with_context<H>(
        &self,
        ctx: &mut MiddlewareContext,
        request: Request,
        dispatcher: H,
    ) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
    {
        let next = self.build_chain(dispatcher);
        next.run(ctx, request).await
    }

    fn build_chain<'a, H>(&'a self, dispatcher: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        let mut next = Next::handler(dispatcher);
        for (_, middleware) in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next
    }

    /// Returns the names of the configured stages, outermost first.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|(_, mw)| mw.name()).collect()
    }

    /// Returns the configured stages, outermost first.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        self.stages.iter().map(|(stage, _)| *stage).collect()
    }

    /// Returns the number of configured stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// Builder for constructing a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    metrics: Option<MetricsMiddleware>,
    logging: Option<LoggingMiddleware>,
    rate_limit: Option<RateLimitMiddleware>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the metrics stage.
    #[must_use]
    pub fn metrics(mut self, middleware: MetricsMiddleware) -> Self {
        self.metrics = Some(middleware);
        self
    }

    /// Sets the logging stage.
    #[must_use]
    pub fn logging(mut self, middleware: LoggingMiddleware) -> Self {
        self.logging = Some(middleware);
        self
    }

    /// Sets the rate limit stage.
    #[must_use]
    pub fn rate_limit(mut self, middleware: RateLimitMiddleware) -> Self {
        self.rate_limit = Some(middleware);
        self
    }

    /// Builds the pipeline in [`Stage`] order.
    #[must_use]
    pub fn build(self) -> Pipeline {
        let mut stages: Vec<(Stage, BoxedMiddleware)> = Vec::with_capacity(3);
        if let Some(mw) = self.metrics {
            stages.push((Stage::Metrics, Arc::new(mw)));
        }
        if let Some(mw) = self.logging {
            stages.push((Stage::Logging, Arc::new(mw)));
        }
        if let Some(mw) = self.rate_limit {
            stages.push((Stage::RateLimit, Arc::new(mw)));
        }
        Pipeline { stages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::test_support::request;
    use bytes::Bytes;
    use http::{Response as HttpResponse, StatusCode};
    use http_body_util::Full;
    use vinyl_telemetry::MetricsAggregator;

    fn ok(_ctx: &mut MiddlewareContext, _req: Request) -> BoxFuture<'static, Response> {
        Box::pin(async {
            HttpResponse::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::from("handler")))
                .unwrap()
        })
    }

    #[tokio::test]
    async fn test_empty_pipeline_calls_dispatcher() {
        let pipeline = Pipeline::builder().build();
        assert_eq!(pipeline.stage_count(), 0);

        let response = pipeline
            .process(MiddlewareContext::new(), request("/albums"), ok)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_builder_order_does_not_matter() {
        let aggregator = Arc::new(MetricsAggregator::new());
        let pipeline = Pipeline::builder()
            .rate_limit(RateLimitMiddleware::builder(Arc::clone(&aggregator)).build())
            .metrics(MetricsMiddleware::new(aggregator))
            .logging(LoggingMiddleware::new())
            .build();

        assert_eq!(pipeline.stages(), Stage::all().to_vec());
        assert_eq!(pipeline.stage_names(), vec!["metrics", "logging", "rate_limit"]);
    }

    #[test]
    fn test_absent_stages_are_skipped() {
        let pipeline = Pipeline::builder().logging(LoggingMiddleware::new()).build();
        assert_eq!(pipeline.stages(), vec![Stage::Logging]);
    }

    #[test]
    fn test_stage_ordering() {
        assert!(Stage::Metrics < Stage::Logging);
        assert!(Stage::Logging < Stage::RateLimit);
        assert_eq!(Stage::Metrics as u8, 1);
        assert_eq!(Stage::RateLimit as u8, 3);
    }

    #[test]
    fn test_stage_names_match_middleware_names() {
        let aggregator = Arc::new(MetricsAggregator::new());
        let pipeline = Pipeline::builder()
            .metrics(MetricsMiddleware::new(Arc::clone(&aggregator)))
            .logging(LoggingMiddleware::new())
            .rate_limit(RateLimitMiddleware::builder(aggregator).build())
            .build();

        let expected: Vec<_> = Stage::all().iter().map(|s| s.name()).collect();
        assert_eq!(pipeline.stage_names(), expected);
    }
}

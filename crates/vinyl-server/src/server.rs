//! HTTP server implementation.
//!
//! # Architecture
//!
//! - TCP listener bound to `server.http_addr`
//! - One task per connection, serving HTTP/1.1 through hyper
//! - Request bodies collected into memory under `server.request_timeout_ms`,
//!   capped at `server.max_body_bytes`
//! - Every request runs through the [`Pipeline`] (metrics, logging, rate
//!   limit) before reaching the [`AlbumService`]. A body that cannot be read
//!   still goes through the pipeline, answered with 400, 408 or 413 in place
//!   of the album service, so it is counted, logged and rate limited
//! - A background [`SnapshotPersister`] saving metrics to the store
//! - Graceful shutdown: stop accepting, drain connections up to
//!   `server.shutdown_timeout_secs`, then save a final snapshot
//!
//! # Example
//!
//! ```rust,no_run
//! use vinyl_config::VinylConfig;
//! use vinyl_server::Server;
//!
//! # async fn run() -> Result<(), vinyl_server::ServerError> {
//! let server = Server::from_config(VinylConfig::default())?;
//! server.run().await
//! # }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use vinyl_config::{ClientKey, VinylConfig};
use vinyl_core::{Clock, RequestId, SystemClock};
use vinyl_middleware::stages::{
    KeyExtractor, LoggingMiddleware, MetricsMiddleware, RateLimitMiddleware,
};
use vinyl_middleware::{
    BoxFuture, MiddlewareContext, Pipeline, Request, Response, ResponseExt,
};
use vinyl_telemetry::{open_store, MetricsAggregator, MetricsStore};

use crate::catalog::AlbumCatalog;
use crate::error::{ServerError, ServerResult};
use crate::handlers::AlbumService;
use crate::persistence::SnapshotPersister;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Header carrying an upstream request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The Vinyl HTTP server.
pub struct Server {
    config: VinylConfig,
    pipeline: Arc<Pipeline>,
    service: Arc<AlbumService>,
    aggregator: Arc<MetricsAggregator>,
    store: Arc<dyn MetricsStore>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("http_addr", &self.config.server.http_addr)
            .field("stages", &self.pipeline.stage_names())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Builds a server from configuration with the default collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the metrics backend
    /// is unsupported, or the stored snapshot cannot be loaded.
    pub fn from_config(config: VinylConfig) -> ServerResult<Self> {
        Self::builder(config).build()
    }

    /// Creates a builder for overriding collaborators.
    #[must_use]
    pub fn builder(config: VinylConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &VinylConfig {
        &self.config
    }

    /// Returns the request pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns the metrics aggregator.
    #[must_use]
    pub fn aggregator(&self) -> &Arc<MetricsAggregator> {
        &self.aggregator
    }

    /// Returns the album catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<AlbumCatalog> {
        self.service.catalog()
    }

    /// Returns the metrics store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MetricsStore> {
        &self.store
    }

    /// Runs one request through the pipeline and the album service.
    pub async fn handle(&self, peer: Option<SocketAddr>, request: Request) -> Response {
        let ctx = Self::context(peer, &request);
        let service = Arc::clone(&self.service);
        let dispatcher = move |_ctx: &mut MiddlewareContext, request: Request| -> BoxFuture<'static, Response> {
            Box::pin(async move { service.dispatch(request).await })
        };

        self.pipeline.process(ctx, request, dispatcher).await
    }

    /// Runs a request whose body could not be read through the pipeline,
    /// answering with `failure` where the album service would have run.
    async fn handle_unreadable(
        &self,
        peer: SocketAddr,
        request: Request,
        failure: BodyFailure,
    ) -> Response {
        let ctx = Self::context(Some(peer), &request);
        let dispatcher = move |_ctx: &mut MiddlewareContext, _request: Request| -> BoxFuture<'static, Response> {
            Box::pin(async move { failure.into_response() })
        };

        self.pipeline.process(ctx, request, dispatcher).await
    }

    fn context(peer: Option<SocketAddr>, request: &Request) -> MiddlewareContext {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(RequestId::parse)
            .unwrap_or_default();

        let ctx = MiddlewareContext::with_request_id(request_id);
        match peer {
            Some(peer) => ctx.with_peer_addr(peer),
            None => ctx,
        }
    }

    /// Binds `server.http_addr` and serves until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run(self) -> ServerResult<()> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Binds `server.http_addr` and serves until `shutdown` triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener until `shutdown`
    /// triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> ServerResult<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            stages = ?self.pipeline.stage_names(),
            backend = %self.config.metrics.backend,
            "server listening"
        );

        let persist_stop = ShutdownSignal::new();
        let persister = SnapshotPersister::new(
            Arc::clone(&self.aggregator),
            Arc::clone(&self.store),
            self.config.metrics.snapshot_interval(),
        )
        .spawn(persist_stop.clone());

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        let server = Arc::clone(&server);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream, peer, shutdown).await {
                                tracing::debug!(peer = %peer, error = %e, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to accept connection");
                    }
                },
                () = shutdown.recv() => {
                    tracing::info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        let shutdown_timeout = server.config.server.shutdown_timeout();
        tracing::info!(
            active = tracker.active_connections(),
            timeout_secs = shutdown_timeout.as_secs(),
            "waiting for connections to close"
        );

        if tokio::time::timeout(shutdown_timeout, tracker.wait_for_shutdown())
            .await
            .is_err()
        {
            tracing::warn!(
                active = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            );
        }

        persist_stop.trigger();
        if let Err(e) = persister.await {
            tracing::warn!(error = %e, "metrics persistence task failed");
        }

        tracing::info!("server stopped");
        Ok(())
    }

    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(self);

        let service = service_fn(move |req: http::Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_incoming(peer, req).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }

    async fn handle_incoming(&self, peer: SocketAddr, req: http::Request<Incoming>) -> Response {
        let (parts, body) = req.into_parts();

        match self.read_body(&parts.headers, body).await {
            Ok(bytes) => {
                self.handle(Some(peer), http::Request::from_parts(parts, Full::new(bytes)))
                    .await
            }
            Err(failure) => {
                tracing::warn!(peer = %peer, error = %failure, "failed to read request body");
                let request = http::Request::from_parts(parts, Full::new(Bytes::new()));
                self.handle_unreadable(peer, request, failure).await
            }
        }
    }

    async fn read_body(
        &self,
        headers: &http::HeaderMap,
        body: Incoming,
    ) -> Result<Bytes, BodyFailure> {
        let limit = self.config.server.max_body_bytes;
        let declared = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > u64::try_from(limit).unwrap_or(u64::MAX)) {
            return Err(BodyFailure::TooLarge { limit });
        }

        let timeout = self.config.server.request_timeout();
        match tokio::time::timeout(timeout, Limited::new(body, limit).collect()).await {
            Ok(Ok(collected)) => Ok(collected.to_bytes()),
            Ok(Err(e)) if e.is::<LengthLimitError>() => Err(BodyFailure::TooLarge { limit }),
            Ok(Err(e)) => Err(BodyFailure::Read(e.to_string())),
            Err(_) => Err(BodyFailure::TimedOut),
        }
    }
}

/// Why a request body could not be collected.
#[derive(Debug, Error)]
enum BodyFailure {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("request body timed out")]
    TimedOut,

    #[error("{0}")]
    Read(String),
}

impl BodyFailure {
    fn into_response(self) -> Response {
        match self {
            Self::TooLarge { .. } => {
                Response::message(StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
            }
            Self::TimedOut => Response::message(StatusCode::REQUEST_TIMEOUT, "request timed out"),
            Self::Read(_) => {
                Response::message(StatusCode::BAD_REQUEST, "failed to read request body")
            }
        }
    }
}

/// Builder for [`Server`].
///
/// Unset collaborators are derived from the configuration: the store from
/// `metrics.backend`, a seeded catalog, and the system clock.
#[derive(Debug)]
pub struct ServerBuilder {
    config: VinylConfig,
    store: Option<Arc<dyn MetricsStore>>,
    catalog: Option<AlbumCatalog>,
    clock: Option<Arc<dyn Clock>>,
}

impl ServerBuilder {
    /// Creates a builder for `config`.
    #[must_use]
    pub fn new(config: VinylConfig) -> Self {
        Self {
            config,
            store: None,
            catalog: None,
            clock: None,
        }
    }

    /// Uses `store` instead of opening `metrics.backend`.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses `catalog` instead of the seeded catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: AlbumCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Uses `clock` for latency and rate limiting.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the server, restoring metrics from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the metrics backend
    /// is unsupported, or the stored snapshot cannot be loaded.
    pub fn build(self) -> ServerResult<Server> {
        self.config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => open_store(self.config.metrics.backend)?,
        };
        let restored = store.load()?;
        if restored.total_requests > 0 {
            tracing::info!(total_requests = restored.total_requests, "restored metrics snapshot");
        }
        let aggregator = Arc::new(MetricsAggregator::from_snapshot(restored));

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let pipeline = build_pipeline(&self.config, &aggregator, &clock);

        let catalog = Arc::new(self.catalog.unwrap_or_else(AlbumCatalog::seeded));
        let service = Arc::new(AlbumService::new(catalog, Arc::clone(&aggregator)));

        Ok(Server {
            config: self.config,
            pipeline: Arc::new(pipeline),
            service,
            aggregator,
            store,
        })
    }
}

fn build_pipeline(
    config: &VinylConfig,
    aggregator: &Arc<MetricsAggregator>,
    clock: &Arc<dyn Clock>,
) -> Pipeline {
    let mut builder = Pipeline::builder()
        .metrics(MetricsMiddleware::new(Arc::clone(aggregator)).with_clock(Arc::clone(clock)))
        .logging(LoggingMiddleware::new().with_clock(Arc::clone(clock)));

    let rate_limit = &config.rate_limit;
    if rate_limit.enabled {
        builder = builder.rate_limit(
            RateLimitMiddleware::builder(Arc::clone(aggregator))
                .threshold(rate_limit.threshold)
                .window(rate_limit.window())
                .max_clients(rate_limit.max_clients)
                .idle_ttl(rate_limit.idle_ttl())
                .key_extractor(key_extractor(rate_limit.key))
                .clock(Arc::clone(clock))
                .build(),
        );
    }

    builder.build()
}

const fn key_extractor(key: ClientKey) -> KeyExtractor {
    match key {
        ClientKey::PeerIp => KeyExtractor::PeerIp,
        ClientKey::ForwardedFor => KeyExtractor::ForwardedFor,
        ClientKey::Global => KeyExtractor::Global,
    }
}

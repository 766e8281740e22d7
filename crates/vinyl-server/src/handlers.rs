//! Album API handlers.
//!
//! [`AlbumService`] is the innermost step of the request pipeline: it resolves
//! the route, runs the matching handler against the catalog and bumps the
//! album counters on the aggregator.

use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::BodyExt;
use serde::Serialize;
use vinyl_core::NewAlbum;
use vinyl_middleware::{Request, Response, ResponseExt};
use vinyl_telemetry::MetricsAggregator;

use crate::catalog::AlbumCatalog;
use crate::router::{Operation, Resolution, RouteMatch, Router};

/// Message returned for an unknown album identifier.
pub const ALBUM_NOT_FOUND: &str = "album not found";

/// Message returned for an unknown path.
pub const NOT_FOUND: &str = "not found";

/// Message returned when a known path is requested with the wrong method.
pub const METHOD_NOT_ALLOWED: &str = "Method not allowed";

/// Dispatches requests to the album and metrics handlers.
#[derive(Debug)]
pub struct AlbumService {
    router: Router,
    catalog: Arc<AlbumCatalog>,
    aggregator: Arc<MetricsAggregator>,
}

impl AlbumService {
    /// Creates a service over `catalog` that reports to `aggregator`.
    #[must_use]
    pub fn new(catalog: Arc<AlbumCatalog>, aggregator: Arc<MetricsAggregator>) -> Self {
        Self {
            router: Router::albums(),
            catalog,
            aggregator,
        }
    }

    /// Returns the catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<AlbumCatalog> {
        &self.catalog
    }

    /// Handles one request.
    pub async fn dispatch(&self, request: Request) -> Response {
        let route = match self.router.resolve(request.method(), request.uri().path()) {
            Resolution::Matched(route) => route,
            Resolution::MethodNotAllowed => {
                return Response::message(StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED)
            }
            Resolution::NotFound => return Response::message(StatusCode::NOT_FOUND, NOT_FOUND),
        };

        tracing::debug!(operation = route.operation().name(), "dispatching request");

        match route.operation() {
            Operation::ListAlbums => self.list_albums(),
            Operation::CreateAlbum => self.create_album(request).await,
            Operation::GetAlbum => self.get_album(&route),
            Operation::ExportMetrics => self.export_metrics(),
        }
    }

    fn list_albums(&self) -> Response {
        let albums = self.catalog.list();
        self.aggregator.record_albums_fetched();
        json(StatusCode::OK, &albums)
    }

    async fn create_album(&self, request: Request) -> Response {
        let body = match request.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };

        let new: NewAlbum = match parse_json(&body) {
            Ok(new) => new,
            Err(message) => return Response::message(StatusCode::BAD_REQUEST, &message),
        };

        let album = self.catalog.add(new);
        self.aggregator.record_album_added();
        tracing::debug!(album_id = %album.id, "album added");
        json(StatusCode::CREATED, &album)
    }

    fn get_album(&self, route: &RouteMatch) -> Response {
        route
            .param("id")
            .and_then(|id| self.catalog.get(id))
            .map_or_else(
                || Response::message(StatusCode::NOT_FOUND, ALBUM_NOT_FOUND),
                |album| json(StatusCode::OK, &album),
            )
    }

    fn export_metrics(&self) -> Response {
        json(StatusCode::OK, &self.aggregator.snapshot().export())
    }
}

fn parse_json(body: &Bytes) -> Result<NewAlbum, String> {
    serde_json::from_slice(body).map_err(|e| e.to_string())
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_string(value) {
        Ok(body) => Response::json_body(status, body),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response");
            Response::message(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

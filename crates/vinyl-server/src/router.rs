//! Request routing and path matching.
//!
//! The router maps a method and path to an [`Operation`]. Path templates use
//! `{name}` segments for parameters. Resolution distinguishes a path nobody
//! serves from a known path requested with the wrong method, so the server can
//! answer 404 and 405 respectively.
//!
//! # Example
//!
//! ```rust
//! use vinyl_server::router::{Operation, Resolution, Router};
//! use http::Method;
//!
//! let router = Router::albums();
//!
//! match router.resolve(&Method::GET, "/albums/42") {
//!     Resolution::Matched(m) => {
//!         assert_eq!(m.operation(), Operation::GetAlbum);
//!         assert_eq!(m.param("id"), Some("42"));
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//!
//! assert_eq!(
//!     router.resolve(&Method::DELETE, "/albums"),
//!     Resolution::MethodNotAllowed
//! );
//! ```

use std::collections::HashMap;

use http::Method;

/// Operations served by the album service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `GET /albums`
    ListAlbums,
    /// `POST /albums`
    CreateAlbum,
    /// `GET /albums/{id}`
    GetAlbum,
    /// `GET /metrics`
    ExportMetrics,
}

impl Operation {
    /// Stable operation name, used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ListAlbums => "listAlbums",
            Self::CreateAlbum => "createAlbum",
            Self::GetAlbum => "getAlbum",
            Self::ExportMetrics => "exportMetrics",
        }
    }
}

/// A matched route with extracted path parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    operation: Operation,
    params: HashMap<String, String>,
}

impl RouteMatch {
    /// Returns the matched operation.
    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Returns the extracted path parameters.
    #[must_use]
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Returns a specific path parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Outcome of resolving a request against the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A route matched both path and method.
    Matched(RouteMatch),
    /// The path is served, but not for this method.
    MethodNotAllowed,
    /// No route serves this path.
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct Route {
    method: Method,
    segments: Vec<PathSegment>,
    operation: Operation,
}

impl Route {
    fn new(method: Method, pattern: &str, operation: Operation) -> Self {
        Self {
            method,
            segments: Self::parse_segments(pattern),
            operation,
        }
    }

    fn parse_segments(pattern: &str) -> Vec<PathSegment> {
        split_path(pattern)
            .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => PathSegment::Param(name.to_string()),
                None => PathSegment::Literal(s.to_string()),
            })
            .collect()
    }

    fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let path_segments: Vec<&str> = split_path(path).collect();

        if path_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();

        for (pattern, actual) in self.segments.iter().zip(path_segments.iter()) {
            match pattern {
                PathSegment::Literal(expected) => {
                    if expected != actual {
                        return None;
                    }
                }
                PathSegment::Param(name) => {
                    params.insert(name.clone(), (*actual).to_string());
                }
            }
        }

        Some(params)
    }
}

/// Splits a path on `/` after its leading slash. Empty segments are kept, so
/// `/albums/` has two segments and `/albums` has one.
fn split_path(path: &str) -> std::str::Split<'_, char> {
    path.strip_prefix('/').unwrap_or(path).split('/')
}

/// HTTP request router.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates a new empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Creates the router for the album service.
    #[must_use]
    pub fn albums() -> Self {
        let mut router = Self::new();
        router.add_route(Method::GET, "/albums", Operation::ListAlbums);
        router.add_route(Method::POST, "/albums", Operation::CreateAlbum);
        router.add_route(Method::GET, "/albums/{id}", Operation::GetAlbum);
        router.add_route(Method::GET, "/metrics", Operation::ExportMetrics);
        router
    }

    /// Adds a route. Routes are checked in insertion order; first match wins.
    pub fn add_route(&mut self, method: Method, pattern: impl AsRef<str>, operation: Operation) {
        self.routes
            .push(Route::new(method, pattern.as_ref(), operation));
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Resolves a request method and path.
    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution {
        let mut path_known = false;

        for route in &self.routes {
            if let Some(params) = route.match_path(path) {
                if route.method == *method {
                    return Resolution::Matched(RouteMatch {
                        operation: route.operation,
                        params,
                    });
                }
                path_known = true;
            }
        }

        if path_known {
            Resolution::MethodNotAllowed
        } else {
            Resolution::NotFound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched(resolution: Resolution) -> RouteMatch {
        match resolution {
            Resolution::Matched(m) => m,
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn test_router_new() {
        assert_eq!(Router::new().route_count(), 0);
        assert_eq!(Router::albums().route_count(), 4);
    }

    #[test]
    fn test_list_and_create_share_path() {
        let router = Router::albums();

        let m = matched(router.resolve(&Method::GET, "/albums"));
        assert_eq!(m.operation(), Operation::ListAlbums);
        assert!(m.params().is_empty());

        let m = matched(router.resolve(&Method::POST, "/albums"));
        assert_eq!(m.operation(), Operation::CreateAlbum);
    }

    #[test]
    fn test_get_album_extracts_id() {
        let router = Router::albums();
        let m = matched(router.resolve(&Method::GET, "/albums/0193a1f2-aaaa"));
        assert_eq!(m.operation(), Operation::GetAlbum);
        assert_eq!(m.param("id"), Some("0193a1f2-aaaa"));
        assert_eq!(m.param("missing"), None);
    }

    #[test]
    fn test_trailing_slash_is_an_empty_id() {
        let router = Router::albums();

        let m = matched(router.resolve(&Method::GET, "/albums/"));
        assert_eq!(m.operation(), Operation::GetAlbum);
        assert_eq!(m.param("id"), Some(""));

        assert_eq!(router.resolve(&Method::GET, "/metrics/"), Resolution::NotFound);
        assert_eq!(router.resolve(&Method::GET, "//albums"), Resolution::NotFound);
    }

    #[test]
    fn test_method_not_allowed() {
        let router = Router::albums();
        assert_eq!(router.resolve(&Method::PUT, "/albums"), Resolution::MethodNotAllowed);
        assert_eq!(router.resolve(&Method::DELETE, "/albums/1"), Resolution::MethodNotAllowed);
        assert_eq!(router.resolve(&Method::POST, "/metrics"), Resolution::MethodNotAllowed);
    }

    #[test]
    fn test_not_found() {
        let router = Router::albums();
        assert_eq!(router.resolve(&Method::GET, "/"), Resolution::NotFound);
        assert_eq!(router.resolve(&Method::GET, "/artists"), Resolution::NotFound);
        assert_eq!(router.resolve(&Method::GET, "/albums/1/tracks"), Resolution::NotFound);
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::ListAlbums.name(), "listAlbums");
        assert_eq!(Operation::ExportMetrics.name(), "exportMetrics");
    }
}

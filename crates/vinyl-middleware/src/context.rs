//! Middleware context types.
//!
//! The [`MiddlewareContext`] carries per-request state through the pipeline:
//! the request ID, the peer address of the connection, the client identity
//! resolved by the rate limiter, and typed extensions stages use to hand data
//! to each other.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::SocketAddr;
use vinyl_core::RequestId;

/// Context that flows through the middleware pipeline.
///
/// # Example
///
/// ```
/// use vinyl_middleware::context::MiddlewareContext;
///
/// let ctx = MiddlewareContext::new().with_peer_addr("10.0.0.1:52000".parse().unwrap());
/// assert_eq!(ctx.peer_ip().as_deref(), Some("10.0.0.1"));
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    /// Unique identifier for this request.
    request_id: RequestId,

    /// Remote address of the TCP connection, when known.
    peer_addr: Option<SocketAddr>,

    /// Identity the rate limiter keyed this request on.
    client: Option<String>,

    /// Type-erased extension data.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates a new middleware context with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(RequestId::new())
    }

    /// Creates a context with a specific request ID.
    ///
    /// Useful when the request ID was provided by an upstream proxy.
    #[must_use]
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            peer_addr: None,
            client: None,
            extensions: HashMap::new(),
        }
    }

    /// Attaches the remote address of the connection.
    #[must_use]
    pub fn with_peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the remote address of the connection.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Returns the remote IP without the port.
    #[must_use]
    pub fn peer_ip(&self) -> Option<String> {
        self.peer_addr.map(|addr| addr.ip().to_string())
    }

    /// Returns the client identity, if the rate limiter resolved one.
    #[must_use]
    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }

    /// Records the client identity.
    ///
    /// This should only be called by the rate limit stage.
    pub fn set_client(&mut self, client: String) {
        self.client = Some(client);
    }

    /// Stores a typed extension value.
    ///
    /// # Example
    ///
    /// ```
    /// use vinyl_middleware::context::MiddlewareContext;
    ///
    /// struct Marker(u32);
    ///
    /// let mut ctx = MiddlewareContext::new();
    /// ctx.set_extension(Marker(7));
    /// assert_eq!(ctx.get_extension::<Marker>().unwrap().0, 7);
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}

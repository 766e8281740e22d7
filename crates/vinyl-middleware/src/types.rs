//! Common types used throughout the middleware pipeline.

use bytes::Bytes;
use http::{header, StatusCode};
use http_body_util::Full;

/// The HTTP request type used in the middleware pipeline.
///
/// This is a standard `http::Request` with a `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the middleware pipeline.
///
/// This is a standard `http::Response` with a `Full<Bytes>` body.
pub type Response = http::Response<Full<Bytes>>;

/// Extension trait for building JSON responses.
///
/// Builders never panic: if a response cannot be assembled the caller gets a
/// bare `500 Internal Server Error` instead.
pub trait ResponseExt {
    /// Creates a JSON response from an already serialized body.
    fn json_body(status: StatusCode, body: String) -> Response;

    /// Creates a `{"message": ...}` response.
    fn message(status: StatusCode, message: &str) -> Response;
}

impl ResponseExt for Response {
    fn json_body(status: StatusCode, body: String) -> Response {
        http::Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .unwrap_or_else(|_| internal_error())
    }

    fn message(status: StatusCode, message: &str) -> Response {
        let body = serde_json::json!({ "message": message });
        Self::json_body(status, body.to_string())
    }
}

pub(crate) fn internal_error() -> Response {
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_message_response() {
        let response = Response::message(StatusCode::NOT_FOUND, "album not found");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], "album not found");
    }

    #[test]
    fn test_internal_error_fallback() {
        assert_eq!(internal_error().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

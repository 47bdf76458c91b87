//! Terminal responses produced inside the processor chain.
use axum::{
    body::Body as AxumBody,
    response::{IntoResponse, Response as AxumResponse},
};
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, header};

/// A fully buffered response: `{content, headers, status}`.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub content: Bytes,
}

impl GatewayResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, content: Bytes) -> Self {
        Self {
            status,
            headers,
            content,
        }
    }

    /// Gateway failure envelope `{error, message}`.
    pub fn error(status: StatusCode, error: &str, message: &str) -> Self {
        let body = serde_json::json!({
            "error": error,
            "message": message,
        });
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Self::new(status, headers, Bytes::from(body.to_string()))
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::error(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn route_not_found() -> Self {
        Self::error(StatusCode::NOT_FOUND, "route_not_found", "route not found")
    }

    /// Bare 500 with no detail. Upstream failures and internal bugs look the same.
    pub fn internal_error() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            HeaderMap::new(),
            Bytes::new(),
        )
    }
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> AxumResponse {
        let mut response = AxumResponse::new(AxumBody::from(self.content));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

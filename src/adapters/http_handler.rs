//! Front controller: the axum surface of the gateway.
//!
//! * `GET /health` and `GET /metrics` are answered natively.
//! * Paths under the configured API prefix are buffered, stripped of the
//!   prefix and handed to [`GatewayService::handle`].
//! * Anything else is `404 route_not_found`.
use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::ConnectInfo,
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use hyper::Request;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::core::{GatewayResponse, GatewayService, InboundRequest};

/// HTTP handler for the Conduit gateway
#[derive(Clone)]
pub struct HttpHandler {
    gateway_service: Arc<GatewayService>,
    metrics: PrometheusHandle,
}

impl HttpHandler {
    pub fn new(gateway_service: Arc<GatewayService>, metrics: PrometheusHandle) -> Self {
        Self {
            gateway_service,
            metrics,
        }
    }

    /// Router sending every request through [`HttpHandler::handle_request`].
    pub fn router(self) -> Router {
        let handler = Arc::new(self);
        Router::new().fallback(move |req: Request<AxumBody>| {
            let handler = Arc::clone(&handler);
            async move { handler.handle_request(req).await }
        })
    }

    pub async fn handle_request(&self, req: Request<AxumBody>) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        tracing::trace!("Handling {} request to {}", method, path);

        match (&method, path.as_str()) {
            (&Method::GET, "/health") => self.handle_health_check(),
            (&Method::GET, "/metrics") => self.handle_metrics(),
            _ => match strip_prefix(&self.gateway_service.config().api_prefix, &path) {
                Some(inner) => self.handle_proxy_request(req, inner).await,
                None => GatewayResponse::route_not_found().into_response(),
            },
        }
    }

    fn handle_health_check(&self) -> Response {
        let snapshot = self.gateway_service.directory().snapshot();
        let status = if snapshot.is_loaded() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };

        let health_data = serde_json::json!({
            "status": if status == StatusCode::OK { "ok" } else { "unavailable" },
            "clients": {
                "loaded": snapshot.is_loaded(),
                "count": snapshot.len(),
                "last_refresh": snapshot.loaded_at().map(|at| at.to_rfc3339()),
            },
            "routes": self.gateway_service.routes().len(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            health_data.to_string(),
        )
            .into_response()
    }

    fn handle_metrics(&self) -> Response {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            self.metrics.render(),
        )
            .into_response()
    }

    async fn handle_proxy_request(&self, req: Request<AxumBody>, path: String) -> Response {
        let peer_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let (parts, body) = req.into_parts();

        let limit = self.gateway_service.config().max_body_bytes;
        let body = match axum::body::to_bytes(body, limit).await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!("Rejected inbound body: {}", e);
                return GatewayResponse::error(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "payload_too_large",
                    "request body too large",
                )
                .into_response();
            }
        };

        let request = InboundRequest {
            method: parts.method,
            path,
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body,
            peer_addr,
        };
        self.gateway_service.handle(request).await.into_response()
    }
}

/// The path relative to `prefix`, or `None` when outside it.
/// `/api/v1` itself maps to `/`; `/api/v1x` is outside.
pub fn strip_prefix(prefix: &str, path: &str) -> Option<String> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path.to_string());
    }
    match path.strip_prefix(prefix)? {
        "" => Some("/".to_string()),
        rest if rest.starts_with('/') => Some(rest.to_string()),
        _ => None,
    }
}

use std::time::Duration;

use async_trait::async_trait;
use eyre::{Result, WrapErr, eyre};
use reqwest::Client;
use serde_json::Value;

use crate::{
    config::GatewayConfig,
    ports::client_source::{ClientSource, DirectoryError},
};

/// Client directory source backed by the auth service's `GET /clients`.
pub struct HttpClientSource {
    url: String,
    client: Client,
}

impl HttpClientSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("Failed to build directory HTTP client")?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// The directory lives at `{target of clients.directory_route}{clients.path}`.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let route = config
            .route_named(&config.clients.directory_route)
            .ok_or_else(|| {
                eyre!(
                    "Directory route '{}' is not configured",
                    config.clients.directory_route
                )
            })?;
        let url = format!(
            "{}{}",
            route.target.trim_end_matches('/'),
            config.clients.path
        );
        tracing::info!(%url, "Using client directory endpoint");
        Self::new(url, Duration::from_millis(config.upstream.default_timeout_ms))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ClientSource for HttpClientSource {
    async fn fetch_clients(&self) -> Result<Vec<Value>, DirectoryError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status(status));
        }

        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, http::StatusCode, routing::get};
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;
    use crate::config::models::RouteDescriptor;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_fetches_client_list() -> Result<()> {
        let base = serve(Router::new().route(
            "/clients",
            get(|| async { Json(json!([{"_id": "a"}, {"_id": "b"}])) }),
        ))
        .await;

        let config = GatewayConfig {
            routes: vec![RouteDescriptor {
                name: "auth-clients-service".to_string(),
                target: base,
                ..RouteDescriptor::default()
            }],
            ..GatewayConfig::default()
        };
        let source = HttpClientSource::from_config(&config)?;
        let clients = source.fetch_clients().await?;
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[1]["_id"], "b");
        Ok(())
    }

    #[tokio::test]
    async fn test_error_status_and_bad_payload() -> Result<()> {
        let base = serve(
            Router::new()
                .route("/down", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
                .route("/garbage", get(|| async { "not json" })),
        )
        .await;

        let down = HttpClientSource::new(format!("{base}/down"), Duration::from_secs(2))?;
        assert!(matches!(
            down.fetch_clients().await,
            Err(DirectoryError::Status(StatusCode::SERVICE_UNAVAILABLE))
        ));

        let garbage = HttpClientSource::new(format!("{base}/garbage"), Duration::from_secs(2))?;
        assert!(matches!(
            garbage.fetch_clients().await,
            Err(DirectoryError::Decode(_))
        ));
        Ok(())
    }

    #[test]
    fn test_missing_directory_route() {
        assert!(HttpClientSource::from_config(&GatewayConfig::default()).is_err());
    }
}

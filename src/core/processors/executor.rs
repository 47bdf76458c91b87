//! Terminal processor: performs the upstream call.
//!
//! The wait covers sending the request *and* buffering the whole body, and
//! is bounded by the route timeout or the global default. A timeout or a
//! transport failure is returned as an error so the chain answers with its
//! generic 500. Redirects are returned as received.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::{Result, WrapErr, eyre};
use http::{HeaderMap, HeaderValue, Method, Request, header};
use http_body_util::BodyExt;

use super::HOP_BY_HOP;
use crate::{
    core::{
        chain::{Processor, ProcessorOutcome},
        client_directory::ClientDirectory,
        context::RequestContext,
        response::GatewayResponse,
        route_table::CompiledRoute,
    },
    metrics::{self, UpstreamRequestTimer},
    ports::http_client::{HttpClient, HttpClientError},
};

pub struct ExecutorProcessor {
    route: Arc<CompiledRoute>,
    client: Arc<dyn HttpClient>,
    directory: Arc<ClientDirectory>,
    default_timeout: Duration,
}

impl ExecutorProcessor {
    pub fn new(
        route: Arc<CompiledRoute>,
        client: Arc<dyn HttpClient>,
        directory: Arc<ClientDirectory>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            route,
            client,
            directory,
            default_timeout,
        }
    }

    fn timeout(&self) -> Duration {
        self.route
            .descriptor
            .timeout
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout)
    }

    fn build_request(ctx: &RequestContext, url: &str, method: Method) -> Result<Request<AxumBody>> {
        let mut builder = Request::builder().method(method).uri(url);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(ctx.headers.clone());
        }
        let body = ctx
            .body
            .clone()
            .map(AxumBody::from)
            .unwrap_or_else(AxumBody::empty);
        builder
            .body(body)
            .wrap_err_with(|| format!("Failed to build upstream request for '{url}'"))
    }

    /// Spawned so the response does not wait on the directory service.
    fn nudge_directory(&self) {
        let directory = Arc::clone(&self.directory);
        let route = self.route.name().to_string();
        tokio::spawn(async move {
            match directory.refresh_now().await {
                Ok(count) => tracing::debug!(%route, clients = count, "Directory refreshed after access"),
                Err(e) => tracing::warn!(%route, "Directory refresh after access failed: {:#}", e),
            }
        });
    }
}

/// One value per header name; repeated values are joined with `", "`.
/// `Set-Cookie` keeps its separate values since joining would corrupt them.
fn flatten_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut flattened = HeaderMap::with_capacity(upstream.keys_len());
    for name in upstream.keys() {
        if HOP_BY_HOP.contains(&name.as_str()) || *name == header::CONTENT_LENGTH {
            continue;
        }
        if *name == header::SET_COOKIE {
            for value in upstream.get_all(name) {
                flattened.append(name.clone(), value.clone());
            }
            continue;
        }

        let mut values = upstream.get_all(name).iter();
        let Some(first) = values.next() else { continue };
        let mut joined = first.as_bytes().to_vec();
        for value in values {
            joined.extend_from_slice(b", ");
            joined.extend_from_slice(value.as_bytes());
        }
        match HeaderValue::from_bytes(&joined) {
            Ok(value) => {
                flattened.insert(name.clone(), value);
            }
            Err(_) => {
                flattened.insert(name.clone(), first.clone());
            }
        }
    }
    flattened
}

#[async_trait]
impl Processor for ExecutorProcessor {
    fn name(&self) -> &'static str {
        "executor"
    }

    async fn process(&mut self, ctx: &RequestContext) -> Result<ProcessorOutcome> {
        let url = ctx
            .url
            .as_deref()
            .ok_or_else(|| eyre!("no upstream url in context"))?;
        let method = ctx.method.clone().unwrap_or(Method::GET);
        let request = Self::build_request(ctx, url, method.clone())?;

        let limit = self.timeout();
        let route = self.route.name();
        tracing::debug!(%route, %method, %url, timeout_ms = limit.as_millis() as u64, "Calling upstream");

        let timer = UpstreamRequestTimer::new(route, method.as_str());
        let client = Arc::clone(&self.client);
        let call = async move {
            let response = client.send_request(request).await?;
            let (parts, body) = response.into_parts();
            let content = body
                .collect()
                .await
                .map_err(|e| HttpClientError::BodyError(e.to_string()))?
                .to_bytes();
            Ok::<_, HttpClientError>((parts, content))
        };
        let result = tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(HttpClientError::Timeout(limit.as_millis() as u64)));
        drop(timer);

        let status_label = match &result {
            Ok((parts, _)) => parts.status.as_str().to_string(),
            Err(_) => "error".to_string(),
        };
        metrics::increment_upstream_request_total(route, method.as_str(), &status_label);

        if self.route.descriptor.on_access_refresh_clients {
            self.nudge_directory();
        }

        let (parts, content) =
            result.wrap_err_with(|| format!("Upstream call {method} {url} failed"))?;
        tracing::debug!(%route, status = %parts.status, bytes = content.len(), "Upstream answered");

        Ok(ProcessorOutcome::respond(GatewayResponse::new(
            parts.status,
            flatten_headers(&parts.headers),
            content,
        )))
    }
}

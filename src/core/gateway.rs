//! Core gateway orchestration service.
//!
//! The `GatewayService` aggregates immutable configuration (`GatewayConfig`)
//! with the runtime collaborators every request needs (route table, shared
//! rate limiters, response cache, client directory, upstream client). It:
//! * resolves the route for an inbound request (404 before any processor)
//! * builds a fresh processor chain for the matched route
//! * runs the chain inside a request span and returns its response
//!
//! Limiters and cache policies are built once at construction so the hot
//! path only clones `Arc`s.
use std::{collections::HashMap, sync::Arc, time::Duration};

use eyre::{Result, WrapErr, eyre};
use http::{HeaderMap, HeaderValue};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    config::GatewayConfig,
    core::{
        chain::ProcessorChain,
        client_directory::ClientDirectory,
        context::InboundRequest,
        processors::{
            BodyProcessor, CachePolicy, CacheProcessor, ExecutorProcessor, HeadersProcessor,
            LimiterProcessor, LoggerProcessor, MetricsProcessor, SecurityProcessor,
            TracesProcessor, UrlProcessor, traces::REQUEST_ID_HEADER,
        },
        rate_limiter::RouteRateLimiter,
        response::GatewayResponse,
        response_cache::ResponseCache,
        route_table::{RouteMatch, RouteTable},
        token::TokenVerifier,
    },
    metrics,
    ports::http_client::HttpClient,
    tracing_setup::create_request_span,
};

/// Central orchestrator for route resolution and chain execution.
///
/// Construct with [`GatewayService::new`]; share behind an `Arc`.
pub struct GatewayService {
    config: Arc<GatewayConfig>,
    routes: RouteTable,
    limiters: HashMap<String, RouteRateLimiter>, // keyed by route name
    cache_policies: HashMap<String, CachePolicy>,
    cache: Arc<ResponseCache>,
    directory: Arc<ClientDirectory>,
    http_client: Arc<dyn HttpClient>,
    verifier: Arc<TokenVerifier>,
}

impl GatewayService {
    /// Compile the route table and build per-route limiters and cache
    /// policies. Any invalid route setting fails construction.
    pub fn new(
        config: Arc<GatewayConfig>,
        directory: Arc<ClientDirectory>,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self> {
        let routes = RouteTable::new(&config.routes).wrap_err("Failed to build route table")?;

        let mut limiters = HashMap::new();
        let mut cache_policies = HashMap::new();
        for route in &config.routes {
            if let Some(limits) = &route.limits {
                let limiter = RouteRateLimiter::new(limits).map_err(|e| {
                    eyre!("Failed to create rate limiter for route '{}': {e}", route.name)
                })?;
                limiters.insert(route.name.clone(), limiter);
            }
            if let Some(cache) = &route.cache {
                let policy = CachePolicy::from_config(cache)
                    .wrap_err_with(|| format!("Invalid cache policy for route '{}'", route.name))?;
                cache_policies.insert(route.name.clone(), policy);
            }
        }

        tracing::info!(
            routes = routes.len(),
            limiters = limiters.len(),
            cached_routes = cache_policies.len(),
            "Gateway service ready"
        );

        Ok(Self {
            verifier: Arc::new(TokenVerifier::new(&config.security)),
            config,
            routes,
            limiters,
            cache_policies,
            cache: Arc::new(ResponseCache::new()),
            directory,
            http_client,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn directory(&self) -> &Arc<ClientDirectory> {
        &self.directory
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// The inbound `X-Request-ID` when usable, otherwise a fresh UUID.
    pub fn request_id(headers: &HeaderMap) -> String {
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|id| !id.is_empty() && id.len() <= 128)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    /// Assemble the per-request processor list for a matched route.
    pub fn build_chain(
        &self,
        matched: &RouteMatch,
        request: Arc<InboundRequest>,
        request_id: &str,
    ) -> ProcessorChain {
        let route = &matched.route;
        let descriptor = &route.descriptor;
        let method = request.method.as_str();

        let mut chain = ProcessorChain::new();
        chain.add(TracesProcessor::new(request_id));
        chain.add(MetricsProcessor::new(route.name(), method));
        chain.add(LoggerProcessor::new(route.name(), method, request.path.as_str()));
        chain.add(HeadersProcessor::new(Arc::clone(&request)));
        chain.add(BodyProcessor::new(request.body.clone()));
        chain.add(UrlProcessor::new(matched.clone(), Arc::clone(&request)));

        if descriptor.security.is_some() {
            chain.add(SecurityProcessor::new(
                Arc::clone(route),
                Arc::clone(&request),
                Arc::clone(&self.directory),
                Arc::clone(&self.verifier),
                self.config.security.enforce_scope,
            ));
        }
        if let Some(limiter) = self.limiters.get(route.name()) {
            let peer_ip = request.peer_addr.map(|addr| addr.ip().to_string());
            chain.add(LimiterProcessor::new(route.name(), limiter.clone(), peer_ip));
        }
        if let Some(policy) = self.cache_policies.get(route.name()) {
            chain.add(CacheProcessor::new(
                route.name(),
                policy.clone(),
                Arc::clone(&self.cache),
            ));
        }

        chain.add(ExecutorProcessor::new(
            Arc::clone(route),
            Arc::clone(&self.http_client),
            Arc::clone(&self.directory),
            Duration::from_millis(self.config.upstream.default_timeout_ms),
        ));
        chain
    }

    /// Resolve, build and run the chain for one request.
    pub async fn handle(&self, request: InboundRequest) -> GatewayResponse {
        let request_id = Self::request_id(&request.headers);

        let Some(matched) = self.routes.resolve(&request.path, &request.method) else {
            tracing::debug!(method = %request.method, path = %request.path, "No route matched");
            metrics::increment_request_total("-", request.method.as_str(), 404);
            return with_request_id(GatewayResponse::route_not_found(), &request_id);
        };

        let span = create_request_span(
            request.method.as_str(),
            &request.path,
            &request_id,
            matched.route.name(),
        );
        let request = Arc::new(request);
        let chain = self.build_chain(&matched, request, &request_id);

        let response = chain.run().instrument(span).await;
        with_request_id(response, &request_id)
    }
}

fn with_request_id(mut response: GatewayResponse, request_id: &str) -> GatewayResponse {
    if response.headers.contains_key(REQUEST_ID_HEADER) {
        return response;
    }
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers.insert(REQUEST_ID_HEADER, value);
    }
    response
}

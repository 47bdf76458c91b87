//! Response caching for routes that declare a `cache` policy.
//!
//! The key is `route|method|url|client`, so responses are never shared
//! between clients. A hit short-circuits the chain before the executor; a
//! miss remembers the key and stores the final response in `post_process`
//! when it is a 2xx.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use http::{HeaderValue, Method};

use crate::{
    config::models::CachePolicyConfig,
    core::{
        chain::{Processor, ProcessorOutcome},
        context::RequestContext,
        response::GatewayResponse,
        response_cache::ResponseCache,
    },
};

pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// A parsed route cache policy.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub methods: Vec<Method>,
}

impl CachePolicy {
    pub fn from_config(config: &CachePolicyConfig) -> Result<Self> {
        let ttl = humantime::parse_duration(&config.ttl)
            .wrap_err_with(|| format!("Invalid cache ttl '{}'", config.ttl))?;
        let methods = config
            .methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                    .wrap_err_with(|| format!("Invalid cache method '{m}'"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { ttl, methods })
    }
}

pub struct CacheProcessor {
    route: String,
    policy: CachePolicy,
    store: Arc<ResponseCache>,
    pending_key: Option<String>,
}

impl CacheProcessor {
    pub fn new(route: impl Into<String>, policy: CachePolicy, store: Arc<ResponseCache>) -> Self {
        Self {
            route: route.into(),
            policy,
            store,
            pending_key: None,
        }
    }

    fn key(&self, ctx: &RequestContext) -> Option<String> {
        let method = ctx.method.as_ref()?;
        if !self.policy.methods.contains(method) {
            return None;
        }
        let url = ctx.url.as_deref()?;
        let client = ctx.client.as_deref().map_or("-", |c| c.id.as_str());
        Some(format!("{}|{method}|{url}|{client}", self.route))
    }
}

#[async_trait]
impl Processor for CacheProcessor {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn process(&mut self, ctx: &RequestContext) -> Result<ProcessorOutcome> {
        let Some(key) = self.key(ctx) else {
            return Ok(ProcessorOutcome::pass());
        };

        if let Some(mut hit) = self.store.get(&key).await {
            tracing::debug!(route = %self.route, %key, "Cache hit");
            hit.headers
                .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("HIT"));
            return Ok(ProcessorOutcome::respond(hit));
        }

        tracing::debug!(route = %self.route, %key, "Cache miss");
        self.pending_key = Some(key);
        Ok(ProcessorOutcome::pass())
    }

    async fn post_process(&mut self, _ctx: &RequestContext, response: &GatewayResponse) -> Result<()> {
        let Some(key) = self.pending_key.take() else {
            return Ok(());
        };
        if response.status.is_success() {
            self.store
                .store(key, response.clone(), self.policy.ttl)
                .await;
        }
        Ok(())
    }
}

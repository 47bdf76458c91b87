use async_trait::async_trait;
use eyre::Result;

use crate::core::{
    chain::{Processor, ProcessorOutcome},
    context::RequestContext,
    rate_limiter::{LimitKeys, RouteRateLimiter},
};

/// Counts the request against the route's shared limiter. Runs after
/// security so a client-keyed limit sees the resolved client.
pub struct LimiterProcessor {
    route: String,
    limiter: RouteRateLimiter,
    peer_ip: Option<String>,
}

impl LimiterProcessor {
    pub fn new(route: impl Into<String>, limiter: RouteRateLimiter, peer_ip: Option<String>) -> Self {
        Self {
            route: route.into(),
            limiter,
            peer_ip,
        }
    }
}

#[async_trait]
impl Processor for LimiterProcessor {
    fn name(&self) -> &'static str {
        "limiter"
    }

    async fn process(&mut self, ctx: &RequestContext) -> Result<ProcessorOutcome> {
        let keys = LimitKeys {
            client: ctx.client.as_deref().map(|client| client.id.as_str()),
            ip: self.peer_ip.as_deref(),
        };
        match self.limiter.check(keys) {
            Ok(()) => Ok(ProcessorOutcome::pass()),
            Err(response) => {
                tracing::info!(route = %self.route, client = ?keys.client, ip = ?keys.ip, "Rate limit exceeded");
                Ok(ProcessorOutcome::respond(response))
            }
        }
    }
}

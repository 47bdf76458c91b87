use std::time::Instant;

use async_trait::async_trait;
use eyre::{Report, Result};

use crate::core::{
    chain::{Processor, ProcessorOutcome},
    context::RequestContext,
    response::GatewayResponse,
};

/// Access log: one line per finished request, one error line per failure.
pub struct LoggerProcessor {
    route: String,
    method: String,
    path: String,
    started: Instant,
}

impl LoggerProcessor {
    pub fn new(route: impl Into<String>, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            method: method.into(),
            path: path.into(),
            started: Instant::now(),
        }
    }

    fn client(ctx: &RequestContext) -> &str {
        ctx.client.as_deref().map_or("-", |c| c.id.as_str())
    }
}

#[async_trait]
impl Processor for LoggerProcessor {
    fn name(&self) -> &'static str {
        "logger"
    }

    async fn process(&mut self, _ctx: &RequestContext) -> Result<ProcessorOutcome> {
        Ok(ProcessorOutcome::pass())
    }

    async fn post_process(&mut self, ctx: &RequestContext, response: &GatewayResponse) -> Result<()> {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let status = response.status.as_u16();
        if response.status.is_server_error() {
            tracing::warn!(
                route = %self.route,
                method = %self.method,
                path = %self.path,
                client = Self::client(ctx),
                status,
                elapsed_ms,
                "Request completed with server error"
            );
        } else {
            tracing::info!(
                route = %self.route,
                method = %self.method,
                path = %self.path,
                client = Self::client(ctx),
                status,
                elapsed_ms,
                "Request completed"
            );
        }
        Ok(())
    }

    async fn handle_error(&mut self, error: &Report, ctx: &RequestContext) {
        tracing::error!(
            route = %self.route,
            method = %self.method,
            path = %self.path,
            client = Self::client(ctx),
            url = ctx.url.as_deref().unwrap_or("-"),
            "Request failed: {:#}",
            error
        );
    }
}

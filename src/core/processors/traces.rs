use std::time::Instant;

use async_trait::async_trait;
use eyre::{Report, Result};
use http::HeaderValue;

use crate::core::{
    chain::{Processor, ProcessorOutcome},
    context::{ContextPatch, RequestContext},
    response::GatewayResponse,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Propagates the request id upstream and completes the fields of the
/// surrounding `request` span.
pub struct TracesProcessor {
    request_id: String,
    started: Instant,
}

impl TracesProcessor {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            started: Instant::now(),
        }
    }

    fn finish(&self, status: u16) {
        let span = tracing::Span::current();
        span.record("http.status_code", status);
        span.record("duration_ms", self.started.elapsed().as_millis() as u64);
    }
}

#[async_trait]
impl Processor for TracesProcessor {
    fn name(&self) -> &'static str {
        "traces"
    }

    async fn process(&mut self, _ctx: &RequestContext) -> Result<ProcessorOutcome> {
        let mut patch = ContextPatch {
            request_id: Some(self.request_id.clone()),
            ..ContextPatch::default()
        };
        if let Ok(value) = HeaderValue::from_str(&self.request_id) {
            patch.headers.insert(REQUEST_ID_HEADER, value);
        }
        Ok(ProcessorOutcome::with_context(patch))
    }

    async fn post_process(&mut self, _ctx: &RequestContext, response: &GatewayResponse) -> Result<()> {
        self.finish(response.status.as_u16());
        Ok(())
    }

    async fn handle_error(&mut self, _error: &Report, _ctx: &RequestContext) {
        self.finish(500);
    }
}

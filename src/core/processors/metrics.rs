use async_trait::async_trait;
use eyre::{Report, Result};

use crate::{
    core::{
        chain::{Processor, ProcessorOutcome},
        context::RequestContext,
        response::GatewayResponse,
    },
    metrics::{self, RequestTimer},
};

/// Counts every finished request by route, method and status and records
/// its latency. Rejected and failed requests are counted as well.
pub struct MetricsProcessor {
    route: String,
    method: String,
    timer: Option<RequestTimer>,
}

impl MetricsProcessor {
    pub fn new(route: impl Into<String>, method: impl Into<String>) -> Self {
        let route = route.into();
        let method = method.into();
        let timer = Some(RequestTimer::new(&route, &method));
        Self {
            route,
            method,
            timer,
        }
    }

    fn record(&mut self, status: u16) {
        metrics::increment_request_total(&self.route, &self.method, status);
        // dropping the timer records the duration
        self.timer.take();
    }
}

#[async_trait]
impl Processor for MetricsProcessor {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn process(&mut self, _ctx: &RequestContext) -> Result<ProcessorOutcome> {
        Ok(ProcessorOutcome::pass())
    }

    async fn post_process(&mut self, _ctx: &RequestContext, response: &GatewayResponse) -> Result<()> {
        self.record(response.status.as_u16());
        Ok(())
    }

    async fn handle_error(&mut self, _error: &Report, _ctx: &RequestContext) {
        self.record(500);
    }
}

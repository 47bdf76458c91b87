//! Processor chain engine.
//!
//! A chain is an ordered list of boxed [`Processor`]s built for a single
//! request. Running it:
//! 1. starts from an empty [`RequestContext`];
//! 2. calls `process` on each processor in order, merging the returned patch
//!    and stopping at the first processor that yields a response;
//! 3. once a response exists, calls `post_process` on *every* processor in
//!    the list, including ones the iteration never reached;
//! 4. if any processor fails, calls `handle_error` on every processor and
//!    answers a bare 500.
//!
//! Expected rejections (401, 404, 429 ...) are responses, not errors, so the
//! post-processing hooks run uniformly for them.
use async_trait::async_trait;
use eyre::{Report, Result, WrapErr};

use crate::core::{
    context::{ContextPatch, RequestContext},
    response::GatewayResponse,
};

/// What a processor hands back: a context patch and optionally a terminal
/// response. The response, when present, ends iteration.
#[derive(Debug, Default)]
pub struct ProcessorOutcome {
    pub context: ContextPatch,
    pub response: Option<GatewayResponse>,
}

impl ProcessorOutcome {
    /// Continue without changing the context.
    pub fn pass() -> Self {
        Self::default()
    }

    /// Continue with additional context.
    pub fn with_context(context: ContextPatch) -> Self {
        Self {
            context,
            response: None,
        }
    }

    /// Stop the chain with this response.
    pub fn respond(response: GatewayResponse) -> Self {
        Self {
            context: ContextPatch::default(),
            response: Some(response),
        }
    }
}

/// One step of the request pipeline. Instances are built per request and
/// never shared between requests.
#[async_trait]
pub trait Processor: Send {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    async fn process(&mut self, ctx: &RequestContext) -> Result<ProcessorOutcome>;

    /// Called once per processor after a response was produced.
    async fn post_process(
        &mut self,
        _ctx: &RequestContext,
        _response: &GatewayResponse,
    ) -> Result<()> {
        Ok(())
    }

    /// Called once per processor when the chain failed.
    async fn handle_error(&mut self, _error: &Report, _ctx: &RequestContext) {}
}

/// Ordered processor list for one request.
#[derive(Default)]
pub struct ProcessorChain {
    processors: Vec<Box<dyn Processor>>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, processor: impl Processor + 'static) {
        self.processors.push(Box::new(processor));
    }

    pub fn add_boxed(&mut self, processor: Box<dyn Processor>) {
        self.processors.push(processor);
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Run the chain to completion. Always yields a response.
    pub async fn run(mut self) -> GatewayResponse {
        let mut ctx = RequestContext::default();

        match self.drive(&mut ctx).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                tracing::error!(
                    processors = ?self.names(),
                    "Processor chain finished without a response"
                );
                GatewayResponse::internal_error()
            }
            Err(error) => {
                tracing::debug!("Processor chain failed: {:#}", error);
                for processor in self.processors.iter_mut() {
                    processor.handle_error(&error, &ctx).await;
                }
                GatewayResponse::internal_error()
            }
        }
    }

    async fn drive(&mut self, ctx: &mut RequestContext) -> Result<Option<GatewayResponse>> {
        for index in 0..self.processors.len() {
            let processor = &mut self.processors[index];
            let name = processor.name();
            let outcome = processor
                .process(ctx)
                .await
                .wrap_err_with(|| format!("processor '{name}' failed"))?;

            ctx.merge(outcome.context);

            if let Some(response) = outcome.response {
                tracing::debug!(processor = name, status = %response.status, "Chain produced a response");
                for processor in self.processors.iter_mut() {
                    let name = processor.name();
                    processor
                        .post_process(ctx, &response)
                        .await
                        .wrap_err_with(|| format!("post-processing in '{name}' failed"))?;
                }
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use http::{HeaderValue, StatusCode};

    use super::*;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Pass,
        AddHeader(&'static str, &'static str),
        Respond(u16),
        Fail,
    }

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: &'static str,
        behaviour: Behaviour,
        log: Log,
    }

    impl Recording {
        fn new(name: &'static str, behaviour: Behaviour, log: &Log) -> Self {
            Self {
                name,
                behaviour,
                log: log.clone(),
            }
        }
    }

    #[async_trait]
    impl Processor for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn process(&mut self, ctx: &RequestContext) -> Result<ProcessorOutcome> {
            self.log.lock().unwrap().push(format!(
                "process:{}:{}",
                self.name,
                ctx.headers.len()
            ));
            match self.behaviour {
                Behaviour::Pass => Ok(ProcessorOutcome::pass()),
                Behaviour::AddHeader(key, value) => {
                    let mut patch = ContextPatch::default();
                    patch
                        .headers
                        .insert(key, HeaderValue::from_static(value));
                    Ok(ProcessorOutcome::with_context(patch))
                }
                Behaviour::Respond(status) => Ok(ProcessorOutcome::respond(GatewayResponse::error(
                    StatusCode::from_u16(status).unwrap(),
                    "stop",
                    "stopped",
                ))),
                Behaviour::Fail => Err(eyre::eyre!("boom")),
            }
        }

        async fn post_process(
            &mut self,
            _ctx: &RequestContext,
            response: &GatewayResponse,
        ) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("post:{}:{}", self.name, response.status.as_u16()));
            Ok(())
        }

        async fn handle_error(&mut self, _error: &Report, _ctx: &RequestContext) {
            self.log
                .lock()
                .unwrap()
                .push(format!("error:{}", self.name));
        }
    }

    fn entries(log: &Log, prefix: &str) -> Vec<String> {
        log.lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    #[tokio::test]
    async fn test_short_circuit_post_processes_every_processor() {
        let log = Log::default();
        let mut chain = ProcessorChain::new();
        chain.add(Recording::new("a", Behaviour::Pass, &log));
        chain.add(Recording::new("guard", Behaviour::Respond(401), &log));
        chain.add(Recording::new("never", Behaviour::Pass, &log));

        let response = chain.run().await;

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(entries(&log, "process:"), vec!["process:a:0", "process:guard:0"]);
        assert_eq!(
            entries(&log, "post:"),
            vec!["post:a:401", "post:guard:401", "post:never:401"]
        );
        assert!(entries(&log, "error:").is_empty());
    }

    #[tokio::test]
    async fn test_failure_notifies_every_processor_once_and_answers_bare_500() {
        for failing_at in 0..3 {
            let log = Log::default();
            let mut chain = ProcessorChain::new();
            for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
                let behaviour = if i == failing_at {
                    Behaviour::Fail
                } else {
                    Behaviour::Pass
                };
                chain.add(Recording::new(name, behaviour, &log));
            }

            let response = chain.run().await;

            assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
            assert!(response.content.is_empty());
            assert_eq!(
                entries(&log, "error:"),
                vec!["error:a", "error:b", "error:c"]
            );
            assert!(entries(&log, "post:").is_empty());
        }
    }

    #[tokio::test]
    async fn test_context_accumulates_between_processors() {
        let log = Log::default();
        let mut chain = ProcessorChain::new();
        chain.add(Recording::new("h1", Behaviour::AddHeader("x-one", "1"), &log));
        chain.add(Recording::new("h2", Behaviour::AddHeader("x-two", "2"), &log));
        chain.add(Recording::new("end", Behaviour::Respond(200), &log));

        chain.run().await;

        // each processor sees the headers added before it
        assert_eq!(
            entries(&log, "process:"),
            vec!["process:h1:0", "process:h2:1", "process:end:2"]
        );
    }

    #[tokio::test]
    async fn test_chain_without_terminal_response_is_500() {
        let log = Log::default();
        let mut chain = ProcessorChain::new();
        chain.add(Recording::new("a", Behaviour::Pass, &log));

        let response = chain.run().await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(entries(&log, "post:").is_empty());
    }
}

use async_trait::async_trait;
use bytes::Bytes;
use eyre::Result;

use crate::core::{
    chain::{Processor, ProcessorOutcome},
    context::{ContextPatch, RequestContext},
};

/// Forwards the buffered inbound body. Empty bodies are left out of the
/// context so the upstream call is sent without one.
pub struct BodyProcessor {
    body: Bytes,
}

impl BodyProcessor {
    pub fn new(body: Bytes) -> Self {
        Self { body }
    }
}

#[async_trait]
impl Processor for BodyProcessor {
    fn name(&self) -> &'static str {
        "body"
    }

    async fn process(&mut self, _ctx: &RequestContext) -> Result<ProcessorOutcome> {
        if self.body.is_empty() {
            return Ok(ProcessorOutcome::pass());
        }
        Ok(ProcessorOutcome::with_context(ContextPatch {
            body: Some(self.body.clone()),
            ..ContextPatch::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_non_empty_bodies_are_forwarded() {
        let ctx = RequestContext::default();
        let empty = BodyProcessor::new(Bytes::new()).process(&ctx).await.unwrap();
        assert!(empty.context.body.is_none());

        let full = BodyProcessor::new(Bytes::from_static(b"{}"))
            .process(&ctx)
            .await
            .unwrap();
        assert_eq!(full.context.body.unwrap(), "{}");
    }
}

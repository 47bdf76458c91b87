use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use http::{HeaderMap, HeaderValue, header};

use super::{HOP_BY_HOP, security::CLIENT_ID_HEADER, traces::REQUEST_ID_HEADER};
use crate::core::{
    chain::{Processor, ProcessorOutcome},
    context::{ContextPatch, InboundRequest, RequestContext},
};

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Set by the gateway itself; caller-supplied values are never forwarded.
const GATEWAY_OWNED: &[&str] = &[CLIENT_ID_HEADER, REQUEST_ID_HEADER];

/// Copies the inbound headers that are safe to forward upstream and adds
/// the `X-Forwarded-*` pair.
pub struct HeadersProcessor {
    request: Arc<InboundRequest>,
}

impl HeadersProcessor {
    pub fn new(request: Arc<InboundRequest>) -> Self {
        Self { request }
    }

    fn forwardable(inbound: &HeaderMap) -> HeaderMap {
        // headers named by `Connection` are hop-by-hop too
        let listed: Vec<String> = inbound
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect();

        let mut headers = HeaderMap::with_capacity(inbound.len());
        for (name, value) in inbound {
            let name_str = name.as_str();
            if HOP_BY_HOP.contains(&name_str)
                || GATEWAY_OWNED.contains(&name_str)
                || *name == header::HOST
                || *name == header::CONTENT_LENGTH
                || listed.iter().any(|l| l == name_str)
            {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        headers
    }
}

#[async_trait]
impl Processor for HeadersProcessor {
    fn name(&self) -> &'static str {
        "headers"
    }

    async fn process(&mut self, _ctx: &RequestContext) -> Result<ProcessorOutcome> {
        let mut headers = Self::forwardable(&self.request.headers);

        if let Some(peer) = self.request.peer_addr {
            let ip = peer.ip().to_string();
            let forwarded_for = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(prior) => format!("{prior}, {ip}"),
                None => ip,
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }
        if let Some(host) = self.request.headers.get(header::HOST) {
            headers.insert(X_FORWARDED_HOST, host.clone());
        }

        Ok(ProcessorOutcome::with_context(ContextPatch {
            headers,
            ..ContextPatch::default()
        }))
    }
}

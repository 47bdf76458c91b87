//! Per-request state handed to processors.
//!
//! [`InboundRequest`] is the immutable view of what the client sent.
//! [`RequestContext`] is the accumulator the chain builds up; processors
//! return a [`ContextPatch`] which is folded in with [`RequestContext::merge`].
use std::{net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::core::client_directory::Client;

/// The inbound request after the API prefix has been stripped.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Path relative to the API prefix, always starting with `/`.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub peer_addr: Option<SocketAddr>,
}

impl InboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            peer_addr: None,
        }
    }
}

/// Accumulated request state. Owned by exactly one chain run.
#[derive(Debug, Default, Clone)]
pub struct RequestContext {
    pub url: Option<String>,
    pub method: Option<Method>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub client: Option<Arc<Client>>,
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Fold a patch in: headers are a union where the patch wins on
    /// conflicting names, every other populated field replaces.
    pub fn merge(&mut self, patch: ContextPatch) {
        if let Some(url) = patch.url {
            self.url = Some(url);
        }
        if let Some(method) = patch.method {
            self.method = Some(method);
        }
        if let Some(body) = patch.body {
            self.body = Some(body);
        }
        if let Some(client) = patch.client {
            self.client = Some(client);
        }
        if let Some(request_id) = patch.request_id {
            self.request_id = Some(request_id);
        }
        // HeaderMap::extend replaces existing entries for a key on its first value.
        self.headers.extend(patch.headers);
    }
}

/// Fields a processor wants to add to the context.
#[derive(Debug, Default, Clone)]
pub struct ContextPatch {
    pub url: Option<String>,
    pub method: Option<Method>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub client: Option<Arc<Client>>,
    pub request_id: Option<String>,
}

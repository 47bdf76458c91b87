//! Bearer-token authentication against the client directory.
//!
//! Order of checks matters: the claimed client is looked up in the current
//! directory snapshot *before* the signature is verified, so an unknown
//! client is reported as `client not found` even for a correctly signed
//! token.
use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use http::{HeaderValue, StatusCode, header};

use crate::core::{
    chain::{Processor, ProcessorOutcome},
    client_directory::ClientDirectory,
    context::{ContextPatch, InboundRequest, RequestContext},
    response::GatewayResponse,
    route_table::CompiledRoute,
    token::{TokenVerifier, scope_includes},
};

pub const CLIENT_ID_HEADER: &str = "x-client-id";

pub struct SecurityProcessor {
    route: Arc<CompiledRoute>,
    request: Arc<InboundRequest>,
    directory: Arc<ClientDirectory>,
    verifier: Arc<TokenVerifier>,
    enforce_scope: bool,
}

impl SecurityProcessor {
    pub fn new(
        route: Arc<CompiledRoute>,
        request: Arc<InboundRequest>,
        directory: Arc<ClientDirectory>,
        verifier: Arc<TokenVerifier>,
        enforce_scope: bool,
    ) -> Self {
        Self {
            route,
            request,
            directory,
            verifier,
            enforce_scope,
        }
    }

    fn reject(&self, message: &str) -> ProcessorOutcome {
        tracing::debug!(route = self.route.name(), reason = message, "Rejected request");
        ProcessorOutcome::respond(GatewayResponse::unauthorized(message))
    }
}

#[async_trait]
impl Processor for SecurityProcessor {
    fn name(&self) -> &'static str {
        "security"
    }

    async fn process(&mut self, _ctx: &RequestContext) -> Result<ProcessorOutcome> {
        let Some(authorization) = self.request.headers.get(header::AUTHORIZATION) else {
            return Ok(self.reject("missing authorization header"));
        };
        let Ok(authorization) = authorization.to_str() else {
            return Ok(self.reject("invalid authorization header"));
        };

        let mut parts = authorization.split(' ');
        if parts.next() != Some("Bearer") {
            return Ok(self.reject("invalid authorization header"));
        }
        let token = parts.next().unwrap_or_default();

        let claimed = match self.verifier.decode_unverified(token) {
            Ok(claims) => self.verifier.claimed_client(&claims),
            Err(e) => {
                tracing::debug!("Token decode failed: {}", e);
                return Ok(self.reject("invalid token"));
            }
        };

        let snapshot = self.directory.snapshot();
        if !snapshot.is_loaded() {
            return Ok(ProcessorOutcome::respond(GatewayResponse::error(
                StatusCode::SERVICE_UNAVAILABLE,
                "directory_unavailable",
                "client directory unavailable",
            )));
        }
        let Some(client) = claimed.and_then(|id| snapshot.find(&id)) else {
            return Ok(self.reject("client not found"));
        };

        let claims = match self.verifier.verify(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(client = %client.id, "Token verification failed: {}", e);
                return Ok(self.reject("invalid token"));
            }
        };

        // Scope checking stays off unless explicitly enabled.
        if self.enforce_scope {
            let required = self
                .route
                .descriptor
                .security
                .as_ref()
                .map(|s| s.scope.as_str())
                .unwrap_or_default();
            if !required.is_empty() && !scope_includes(&claims, required) {
                return Ok(ProcessorOutcome::respond(GatewayResponse::error(
                    StatusCode::FORBIDDEN,
                    "forbidden",
                    "insufficient scope",
                )));
            }
        }

        let mut patch = ContextPatch {
            client: Some(client.clone()),
            ..ContextPatch::default()
        };
        match HeaderValue::from_str(&client.id) {
            Ok(value) => {
                patch.headers.insert(CLIENT_ID_HEADER, value);
            }
            Err(_) => tracing::warn!(client = %client.id, "Client id is not a valid header value"),
        }
        Ok(ProcessorOutcome::with_context(patch))
    }
}

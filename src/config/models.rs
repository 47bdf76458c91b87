//! Configuration data structures for Conduit.
//!
//! These types map directly to YAML (also JSON / TOML) configuration files. They are
//! serde‑friendly and include defaults so that minimal configs remain concise.
//! The route list is ordered: declaration order is the match order.
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

/// Top level gateway configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Inbound prefix under which requests are proxied (stripped before matching).
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Largest inbound body the gateway will buffer.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub routes: Vec<RouteDescriptor>,
    #[serde(default)]
    pub clients: ClientsConfig,
    #[serde(default)]
    pub security: SecuritySettings,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            api_prefix: default_api_prefix(),
            max_body_bytes: default_max_body_bytes(),
            routes: Vec::new(),
            clients: ClientsConfig::default(),
            security: SecuritySettings::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Look up a route descriptor by its name.
    pub fn route_named(&self, name: &str) -> Option<&RouteDescriptor> {
        self.routes.iter().find(|route| route.name == name)
    }
}

/// A single route: templates + verbs mapped onto one static upstream.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RouteDescriptor {
    pub name: String,
    /// Path templates such as `/users/:id`.
    pub context: Vec<String>,
    pub methods: Vec<String>,
    /// Upstream base URL.
    pub target: String,
    /// Ordered `[pattern, replacement]` pairs applied to the matched path.
    #[serde(default)]
    pub path_rewrite: Vec<(String, String)>,
    #[serde(default)]
    pub security: Option<RouteSecurity>,
    #[serde(default)]
    pub limits: Option<RateLimitConfig>,
    #[serde(default)]
    pub cache: Option<CachePolicyConfig>,
    /// Upstream timeout in milliseconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub on_access_refresh_clients: bool,
    #[serde(default)]
    pub internal: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RouteSecurity {
    #[serde(default)]
    pub scope: String,
}

fn default_refresh_interval() -> String {
    "5m".to_string()
}

fn default_directory_route() -> String {
    "auth-clients-service".to_string()
}

fn default_directory_path() -> String {
    "/clients".to_string()
}

/// Client directory refresh settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientsConfig {
    /// Parsed by humantime, e.g. "30s", "5m".
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,
    /// Name of the route whose target hosts the directory.
    #[serde(default = "default_directory_route")]
    pub directory_route: String,
    #[serde(default = "default_directory_path")]
    pub path: String,
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
            directory_route: default_directory_route(),
            path: default_directory_path(),
        }
    }
}

impl ClientsConfig {
    pub fn refresh_interval(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.refresh_interval)
    }
}

fn default_client_claim() -> String {
    "user_id".to_string()
}

/// Token verification settings shared by every secured route.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SecuritySettings {
    #[serde(default)]
    pub jwt_secret: String,
    /// Claim holding the caller's client identifier.
    #[serde(default = "default_client_claim")]
    pub client_claim: String,
    /// Reject tokens whose `scope` claim lacks the route scope (403).
    #[serde(default)]
    pub enforce_scope: bool,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            client_claim: default_client_claim(),
            enforce_scope: false,
        }
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_message() -> String {
    "Too Many Requests".to_string()
}

/// Rate limiting discriminator for how keys are derived.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitBy {
    /// Resolved client identifier (requires a secured route).
    #[default]
    Client,
    /// One shared bucket for the whole route.
    Route,
    /// Peer IP address.
    Ip,
}

/// Behaviour when a key could not be extracted (no client, no peer address).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyPolicy {
    #[default]
    Allow,
    Deny,
}

/// Per‑route rate limit configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub by: RateLimitBy,
    pub requests: u64,
    pub period: String, // Parsed by humantime, e.g., "1s", "5m", "1h"
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default)]
    pub on_missing_key: MissingKeyPolicy,
}

fn default_cache_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

/// Per-route response cache policy.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CachePolicyConfig {
    /// Parsed by humantime.
    pub ttl: String,
    #[serde(default = "default_cache_methods")]
    pub methods: Vec<String>,
}

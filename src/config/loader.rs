use std::{net::SocketAddr, path::Path};

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::GatewayConfig;

/// Environment variable overriding the client directory refresh interval (milliseconds).
pub const ENV_CLIENTS_REFRESH_INTERVAL: &str = "CLIENTS_REFRESH_INTERVAL";
/// Environment variable overriding the default upstream timeout (milliseconds).
pub const ENV_HTTP_DEFAULT_TIMEOUT: &str = "HTTP_DEFAULT_TIMEOUT";
/// Environment variable holding the access token signing secret.
pub const ENV_JWT_SECRET: &str = "JWT_SECRET_ACCESS_TOKEN";
/// Environment variable overriding the listen port.
pub const ENV_PORT: &str = "PORT";

/// Load configuration from a file using the config crate, then apply
/// environment overrides.
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<GatewayConfig> {
    let mut config = load_config_unchecked(config_path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Load configuration from the file alone (no process environment lookups
/// besides `CONDUIT__*` keys).
pub fn load_config_unchecked(config_path: &str) -> Result<GatewayConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Yaml, // Default to YAML
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(Environment::with_prefix("CONDUIT").separator("__"))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let gateway_config: GatewayConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(gateway_config)
}

/// Apply the well-known environment overrides on top of a loaded config.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(ENV_CLIENTS_REFRESH_INTERVAL) {
        let millis: u64 = raw
            .trim()
            .parse()
            .with_context(|| format!("{ENV_CLIENTS_REFRESH_INTERVAL} must be milliseconds, got '{raw}'"))?;
        config.clients.refresh_interval = format!("{millis}ms");
    }

    if let Some(raw) = lookup(ENV_HTTP_DEFAULT_TIMEOUT) {
        config.upstream.default_timeout_ms = raw
            .trim()
            .parse()
            .with_context(|| format!("{ENV_HTTP_DEFAULT_TIMEOUT} must be milliseconds, got '{raw}'"))?;
    }

    if let Some(secret) = lookup(ENV_JWT_SECRET) {
        config.security.jwt_secret = secret;
    }

    if let Some(raw) = lookup(ENV_PORT) {
        let port: u16 = raw
            .trim()
            .parse()
            .with_context(|| format!("{ENV_PORT} must be a port number, got '{raw}'"))?;
        let mut addr: SocketAddr = config
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen_addr '{}'", config.listen_addr))?;
        addr.set_port(port);
        config.listen_addr = addr.to_string();
    }

    Ok(())
}

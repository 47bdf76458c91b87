use std::{collections::HashSet, net::SocketAddr};

use eyre::Result;
use http::Method;
use regex::Regex;

use crate::config::models::{
    CachePolicyConfig, GatewayConfig, RateLimitConfig, RouteDescriptor,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Route conflict detected: {message}")]
    RouteConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire gateway configuration
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if !config.api_prefix.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: "api_prefix".to_string(),
                message: "API prefix must start with '/'".to_string(),
            });
        }

        if config.routes.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes".to_string(),
            });
        } else {
            for route in &config.routes {
                if let Err(mut route_errors) = Self::validate_single_route(route) {
                    errors.append(&mut route_errors);
                }
            }
        }

        if let Err(e) = Self::check_duplicate_names(&config.routes) {
            errors.push(e);
        }

        match config.clients.refresh_interval() {
            Ok(interval) if !interval.is_zero() => {}
            _ => errors.push(ValidationError::InvalidField {
                field: "clients.refresh_interval".to_string(),
                message: format!(
                    "'{}' is not a non-zero duration",
                    config.clients.refresh_interval
                ),
            }),
        }

        match config.route_named(&config.clients.directory_route) {
            Some(route) => {
                if let Err(e) = Self::validate_url(&route.target, "client directory target") {
                    errors.push(e);
                }
            }
            None => errors.push(ValidationError::MissingField {
                field: format!(
                    "route named '{}' (clients.directory_route)",
                    config.clients.directory_route
                ),
            }),
        }

        let has_secured_route = config.routes.iter().any(|route| route.security.is_some());
        if has_secured_route && config.security.jwt_secret.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "security.jwt_secret (required by secured routes)".to_string(),
            });
        }

        if config.upstream.default_timeout_ms == 0 {
            errors.push(ValidationError::InvalidField {
                field: "upstream.default_timeout_ms".to_string(),
                message: "Timeout must be greater than 0".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Validate a single route descriptor
    fn validate_single_route(route: &RouteDescriptor) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let name = route.name.as_str();

        if name.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "route name".to_string(),
            });
        }

        if route.context.is_empty() {
            errors.push(ValidationError::InvalidField {
                field: format!("route '{name}' context"),
                message: "Routes must declare at least one path template".to_string(),
            });
        }
        for template in &route.context {
            if !template.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: format!("route '{name}' context '{template}'"),
                    message: "Path templates must start with '/'".to_string(),
                });
            }
        }

        if route.methods.is_empty() {
            errors.push(ValidationError::InvalidField {
                field: format!("route '{name}' methods"),
                message: "Routes must allow at least one method".to_string(),
            });
        }
        for method in &route.methods {
            if Method::from_bytes(method.to_ascii_uppercase().as_bytes()).is_err() {
                errors.push(ValidationError::InvalidField {
                    field: format!("route '{name}' methods"),
                    message: format!("'{method}' is not a valid HTTP method"),
                });
            }
        }

        if let Err(e) = Self::validate_url(&route.target, &format!("route '{name}' target")) {
            errors.push(e);
        }

        for (pattern, _) in &route.path_rewrite {
            if let Err(e) = Regex::new(pattern) {
                errors.push(ValidationError::InvalidField {
                    field: format!("route '{name}' path_rewrite '{pattern}'"),
                    message: format!("Invalid pattern: {e}"),
                });
            }
        }

        if let Some(limits) = &route.limits {
            if let Err(e) = Self::validate_rate_limit(name, limits) {
                errors.push(e);
            }
        }

        if let Some(cache) = &route.cache {
            if let Err(e) = Self::validate_cache(name, cache) {
                errors.push(e);
            }
        }

        if route.timeout == Some(0) {
            errors.push(ValidationError::InvalidField {
                field: format!("route '{name}' timeout"),
                message: "Timeout must be greater than 0".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    /// Validate rate limit configuration
    fn validate_rate_limit(name: &str, config: &RateLimitConfig) -> ValidationResult<()> {
        if config.requests == 0 || config.requests > u64::from(u32::MAX) {
            return Err(ValidationError::InvalidField {
                field: format!("route '{name}' limits.requests"),
                message: "Rate limit requests must be between 1 and 2^32-1".to_string(),
            });
        }

        match humantime::parse_duration(&config.period) {
            Ok(period) if !period.is_zero() => Ok(()),
            _ => Err(ValidationError::InvalidField {
                field: format!("route '{name}' limits.period"),
                message: "Period must be a non-zero duration like '1s', '1m', or '1h'".to_string(),
            }),
        }
    }

    fn validate_cache(name: &str, config: &CachePolicyConfig) -> ValidationResult<()> {
        if humantime::parse_duration(&config.ttl).is_err() {
            return Err(ValidationError::InvalidField {
                field: format!("route '{name}' cache.ttl"),
                message: format!("'{}' is not a valid duration", config.ttl),
            });
        }
        Ok(())
    }

    fn check_duplicate_names(routes: &[RouteDescriptor]) -> ValidationResult<()> {
        let mut seen = HashSet::new();
        let duplicates: Vec<&str> = routes
            .iter()
            .filter(|route| !seen.insert(route.name.as_str()))
            .map(|route| route.name.as_str())
            .collect();

        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::RouteConflict {
                message: format!("duplicate route names: {}", duplicates.join(", ")),
            })
        }
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

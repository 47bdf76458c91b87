//! Route‑scoped rate limiting abstractions built atop `governor`.
//!
//! Exposes a small enum (`RouteRateLimiter`) that encapsulates one of several
//! limiter modes (whole route, per client, per peer IP) with unified `check`
//! semantics returning a 429 [`GatewayResponse`] on violation. Limiters are
//! built once per route at startup and shared by every request on that route,
//! so `governor`'s in‑memory state is the counting store.
use std::{num::NonZeroU32, sync::Arc};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed, keyed::DefaultKeyedStateStore},
};
use http::StatusCode;

use crate::{
    config::models::{MissingKeyPolicy, RateLimitBy, RateLimitConfig},
    core::response::GatewayResponse,
};

/// Internal wrapper bundling a concrete governor limiter instance with
/// the rejection message and behaviour on missing key.
pub struct LimiterWrapper<RL> {
    pub limiter: RL,
    pub message: String,
    pub on_missing_key: MissingKeyPolicy,
}

pub type DirectRateLimiterImpl = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;
pub type KeyedRateLimiterImpl = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

impl<RL> LimiterWrapper<RL> {
    fn rejection(&self) -> GatewayResponse {
        GatewayResponse::error(StatusCode::TOO_MANY_REQUESTS, "rate_limited", &self.message)
    }
}

impl LimiterWrapper<DirectRateLimiterImpl> {
    fn check_route(&self) -> Result<(), GatewayResponse> {
        if self.limiter.check().is_err() {
            Err(self.rejection())
        } else {
            Ok(())
        }
    }
}

impl LimiterWrapper<KeyedRateLimiterImpl> {
    fn check_keyed(&self, key: Option<&str>) -> Result<(), GatewayResponse> {
        match key {
            Some(key) => {
                if self.limiter.check_key(&key.to_string()).is_err() {
                    Err(self.rejection())
                } else {
                    Ok(())
                }
            }
            None => match self.on_missing_key {
                MissingKeyPolicy::Allow => Ok(()),
                MissingKeyPolicy::Deny => Err(self.rejection()),
            },
        }
    }
}

/// Discriminated union over supported limiter types. Cheap to clone.
#[derive(Clone)]
pub enum RouteRateLimiter {
    Route(Arc<LimiterWrapper<DirectRateLimiterImpl>>),
    Keyed {
        limiter: Arc<LimiterWrapper<KeyedRateLimiterImpl>>,
        by: RateLimitBy,
    },
}

/// Keys a request may be limited by.
#[derive(Debug, Default, Clone, Copy)]
pub struct LimitKeys<'a> {
    pub client: Option<&'a str>,
    pub ip: Option<&'a str>,
}

impl RouteRateLimiter {
    /// Build a limiter from a `RateLimitConfig` definition.
    pub fn new(config: &RateLimitConfig) -> Result<Self, String> {
        let period_duration = humantime::parse_duration(&config.period).map_err(|e| {
            format!(
                "Invalid period string '{period}': {e}",
                period = config.period
            )
        })?;

        let quota_requests = u32::try_from(config.requests)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| "Rate limit 'requests' must be between 1 and 2^32-1".to_string())?;

        // `requests` per `period`, replenished evenly (GCRA) with full burst allowed.
        let replenish_interval = period_duration / quota_requests.get();
        let quota = Quota::with_period(replenish_interval)
            .ok_or_else(|| format!("Invalid period duration: {period_duration:?}"))?
            .allow_burst(quota_requests);

        tracing::info!(
            "Creating rate limiter: by={:?}, requests={}, period={}, on_missing_key={:?}",
            config.by,
            config.requests,
            config.period,
            config.on_missing_key
        );

        match config.by {
            RateLimitBy::Route => Ok(RouteRateLimiter::Route(Arc::new(LimiterWrapper {
                limiter: RateLimiter::direct(quota),
                message: config.message.clone(),
                on_missing_key: config.on_missing_key,
            }))),
            by @ (RateLimitBy::Client | RateLimitBy::Ip) => Ok(RouteRateLimiter::Keyed {
                limiter: Arc::new(LimiterWrapper {
                    limiter: RateLimiter::keyed(quota),
                    message: config.message.clone(),
                    on_missing_key: config.on_missing_key,
                }),
                by,
            }),
        }
    }

    /// Count one request; `Err` carries the 429 response.
    pub fn check(&self, keys: LimitKeys<'_>) -> Result<(), GatewayResponse> {
        match self {
            RouteRateLimiter::Route(limiter) => limiter.check_route(),
            RouteRateLimiter::Keyed { limiter, by } => {
                let key = match by {
                    RateLimitBy::Client => keys.client,
                    RateLimitBy::Ip => keys.ip,
                    RateLimitBy::Route => None,
                };
                limiter.check_keyed(key)
            }
        }
    }
}

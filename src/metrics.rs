//! Lightweight metrics helpers for Conduit.
//!
//! This module exposes a small set of convenience functions and RAII timers
//! wrapping the `metrics` crate macros, plus the Prometheus recorder that
//! backs the native `/metrics` endpoint.
//!
//! Provided metrics (labels vary by family):
//! * `gateway_requests_total` (counter; route, method, status)
//! * `gateway_request_duration_seconds` (histogram; route, method)
//! * `gateway_upstream_requests_total` (counter; route, method, status)
//! * `gateway_upstream_request_duration_seconds` (histogram; route, method)
//! * `gateway_client_directory_size` (gauge)
//! * `gateway_client_directory_refresh_total` (counter; outcome)
//!
//! The `*_timer` structs leverage `Drop` to record durations safely even when
//! early returns or errors occur.
use std::time::{Duration, Instant};

use eyre::WrapErr;
use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::{Lazy, OnceCell};

pub const GATEWAY_REQUESTS_TOTAL: &str = "gateway_requests_total";
pub const GATEWAY_REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
pub const GATEWAY_UPSTREAM_REQUESTS_TOTAL: &str = "gateway_upstream_requests_total";
pub const GATEWAY_UPSTREAM_REQUEST_DURATION_SECONDS: &str =
    "gateway_upstream_request_duration_seconds";
pub const GATEWAY_CLIENT_DIRECTORY_SIZE: &str = "gateway_client_directory_size";
pub const GATEWAY_CLIENT_DIRECTORY_REFRESH_TOTAL: &str = "gateway_client_directory_refresh_total";

static DESCRIPTIONS: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        GATEWAY_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of requests answered by the processor chain."
    );
    describe_histogram!(
        GATEWAY_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of requests answered by the processor chain."
    );
    describe_counter!(
        GATEWAY_UPSTREAM_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of upstream calls issued by the executor."
    );
    describe_histogram!(
        GATEWAY_UPSTREAM_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of upstream calls including body buffering."
    );
    describe_gauge!(
        GATEWAY_CLIENT_DIRECTORY_SIZE,
        "Number of clients in the current directory snapshot."
    );
    describe_counter!(
        GATEWAY_CLIENT_DIRECTORY_REFRESH_TOTAL,
        Unit::Count,
        "Client directory refresh attempts by outcome."
    );
});

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Increment the total request counter for a completed chain run.
pub fn increment_request_total(route: &str, method: &str, status: u16) {
    counter!(
        GATEWAY_REQUESTS_TOTAL,
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed request's duration.
pub fn record_request_duration(route: &str, method: &str, duration: Duration) {
    histogram!(
        GATEWAY_REQUEST_DURATION_SECONDS,
        "route" => route.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Increment the upstream call counter. `status` is the numeric code or
/// `error` when no response arrived.
pub fn increment_upstream_request_total(route: &str, method: &str, status: &str) {
    counter!(
        GATEWAY_UPSTREAM_REQUESTS_TOTAL,
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_upstream_request_duration(route: &str, method: &str, duration: Duration) {
    histogram!(
        GATEWAY_UPSTREAM_REQUEST_DURATION_SECONDS,
        "route" => route.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn set_client_directory_size(count: usize) {
    gauge!(GATEWAY_CLIENT_DIRECTORY_SIZE).set(count as f64);
}

/// `outcome` is `ok` or `error`.
pub fn increment_directory_refresh(outcome: &str) {
    counter!(GATEWAY_CLIENT_DIRECTORY_REFRESH_TOTAL, "outcome" => outcome.to_string()).increment(1);
}

/// RAII helper measuring request duration.
pub struct RequestTimer {
    start: Instant,
    route: String,
    method: String,
}

impl RequestTimer {
    pub fn new(route: &str, method: &str) -> Self {
        Self {
            start: Instant::now(),
            route: route.to_string(),
            method: method.to_string(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(&self.route, &self.method, self.start.elapsed());
    }
}

/// RAII helper measuring upstream call duration.
pub struct UpstreamRequestTimer {
    start: Instant,
    route: String,
    method: String,
}

impl UpstreamRequestTimer {
    pub fn new(route: &str, method: &str) -> Self {
        Self {
            start: Instant::now(),
            route: route.to_string(),
            method: method.to_string(),
        }
    }
}

impl Drop for UpstreamRequestTimer {
    fn drop(&mut self) {
        record_upstream_request_duration(&self.route, &self.method, self.start.elapsed());
    }
}

/// Install the Prometheus recorder and register metric descriptions.
///
/// Idempotent: later calls return the handle created by the first one.
pub fn init_metrics() -> eyre::Result<PrometheusHandle> {
    let handle = PROMETHEUS.get_or_try_init(|| {
        tracing::info!("Installing Prometheus metrics recorder");
        PrometheusBuilder::new()
            .install_recorder()
            .wrap_err("Failed to install Prometheus recorder")
    })?;

    Lazy::force(&DESCRIPTIONS);
    Ok(handle.clone())
}

//! Concrete pipeline processors.
//!
//! The gateway builds one chain per matched request in this order:
//! traces, metrics, logger, headers, body, url, security (optional),
//! limiter (optional), cache (optional), executor.
pub mod body;
pub mod cache;
pub mod executor;
pub mod headers;
pub mod limiter;
pub mod logger;
pub mod metrics;
pub mod security;
pub mod traces;
pub mod url;

pub use body::BodyProcessor;
pub use cache::{CachePolicy, CacheProcessor};
pub use executor::ExecutorProcessor;
pub use headers::HeadersProcessor;
pub use limiter::LimiterProcessor;
pub use logger::LoggerProcessor;
pub use metrics::MetricsProcessor;
pub use security::SecurityProcessor;
pub use traces::TracesProcessor;
pub use url::{UrlProcessor, rewrite_url};

/// Connection-scoped headers that are never forwarded in either direction.
pub(crate) const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

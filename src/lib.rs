//! Conduit - a configuration-driven API gateway.
//!
//! Conduit sits in front of a fleet of HTTP services. Every inbound request under the
//! configured API prefix is matched against an ordered list of route descriptors and then
//! pushed through a per-request chain of processors (tracing, metrics, logging, header
//! forwarding, body forwarding, URL rewriting, token authentication, rate limiting,
//! response caching) before a final executor calls the upstream and relays its answer
//! verbatim.
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use conduit::{
//!     ClientDirectory, GatewayService, HttpClientAdapter, HttpClientSource, HttpHandler,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = Arc::new(conduit::config::load_config("conduit.yaml").await?);
//! let source = Arc::new(HttpClientSource::from_config(&config)?);
//! let directory = Arc::new(ClientDirectory::new(source, config.clients.refresh_interval()?));
//! directory.start().await?;
//!
//! let gateway = Arc::new(GatewayService::new(
//!     Arc::clone(&config),
//!     directory,
//!     Arc::new(HttpClientAdapter::new()?),
//! )?);
//! let app = HttpHandler::new(gateway, conduit::metrics::init_metrics()?).router();
//! # let _ = app;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! Traits in [`ports`] describe the outbound seams (upstream HTTP, client directory
//! source); [`adapters`] implement them and expose the axum front controller. Request
//! handling itself lives in [`core`].
//!
//! # Error Handling
//! Fallible APIs return `eyre::Result<T>` or a domain specific error type. Failures inside
//! the request pipeline never escape as errors: they are turned into JSON error responses.
//!
//! # Concurrency & Data Structures
//! The client directory is published through `arc-swap` so readers never block on a
//! refresh. The response cache uses `scc::HashMap`; rate limiter buckets live in `governor`.

pub mod adapters;
pub mod config;
pub mod core;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub use adapters::{HttpClientAdapter, HttpClientSource, HttpHandler};
pub use core::{ClientDirectory, GatewayService};
pub use ports::{client_source::ClientSource, http_client::HttpClient};
pub use utils::GracefulShutdown;

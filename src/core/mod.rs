pub mod chain;
pub mod client_directory;
pub mod context;
pub mod gateway;
pub mod processors;
pub mod rate_limiter;
pub mod response;
pub mod response_cache;
pub mod route_table;
pub mod token;

pub use chain::{Processor, ProcessorChain, ProcessorOutcome};
pub use client_directory::{Client, ClientDirectory, ClientSnapshot};
pub use context::{ContextPatch, InboundRequest, RequestContext};
pub use gateway::GatewayService;
pub use rate_limiter::RouteRateLimiter;
pub use response::GatewayResponse;
pub use response_cache::ResponseCache;
pub use route_table::{RouteMatch, RouteTable};

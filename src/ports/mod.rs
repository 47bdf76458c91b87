pub mod client_source;
pub mod http_client;

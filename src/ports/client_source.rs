use async_trait::async_trait;
use hyper::StatusCode;
use thiserror::Error;

/// Errors raised while fetching the authorized client list.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DirectoryError {
    #[error("Directory request failed: {0}")]
    Request(String),

    #[error("Directory answered with status {0}")]
    Status(StatusCode),

    #[error("Directory payload could not be decoded: {0}")]
    Decode(String),
}

/// Source of the full client list, typically the auth service's `GET /clients`.
#[async_trait]
pub trait ClientSource: Send + Sync + 'static {
    /// Fetch every client record. Records are raw JSON objects.
    async fn fetch_clients(&self) -> Result<Vec<serde_json::Value>, DirectoryError>;
}

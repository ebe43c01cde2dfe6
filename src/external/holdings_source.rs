use async_trait::async_trait;
use thiserror::Error;

use crate::models::RawPortfolio;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataSourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("timed out fetching holdings")]
    Timeout,

    #[error("rate limited")]
    RateLimited,
}

impl DataSourceError {
    /// Unreadable content fails the same way on every read.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DataSourceError::Parse(_))
    }
}

/// Supplier of portfolio holdings.
///
/// Every call returns a complete, freshly read snapshot of holdings; implementations
/// must not serve a cached result from an earlier call.
#[async_trait]
pub trait HoldingsSource: Send + Sync {
    async fn fetch_holdings(&self) -> Result<RawPortfolio, DataSourceError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

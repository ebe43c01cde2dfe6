use async_trait::async_trait;
use parking_lot::Mutex;

use crate::external::holdings_source::{DataSourceError, HoldingsSource};
use crate::models::RawPortfolio;

/// Single-shot source wrapping a portfolio supplied in the request body.
///
/// Scoped to one request; a second fetch is an error rather than a replay.
pub struct InlineHoldingsSource {
    portfolio: Mutex<Option<RawPortfolio>>,
}

impl InlineHoldingsSource {
    pub fn new(portfolio: RawPortfolio) -> Self {
        Self { portfolio: Mutex::new(Some(portfolio)) }
    }
}

#[async_trait]
impl HoldingsSource for InlineHoldingsSource {
    async fn fetch_holdings(&self) -> Result<RawPortfolio, DataSourceError> {
        self.portfolio
            .lock()
            .take()
            .ok_or_else(|| DataSourceError::Unavailable("inline portfolio already consumed".into()))
    }

    fn describe(&self) -> String {
        "inline".to_string()
    }
}

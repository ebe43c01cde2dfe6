use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use crate::external::holdings_source::{DataSourceError, HoldingsSource};
use crate::models::RawPortfolio;

/// Reads a JSON portfolio export from disk on every fetch.
pub struct FileHoldingsSource {
    path: PathBuf,
}

impl FileHoldingsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl HoldingsSource for FileHoldingsSource {
    async fn fetch_holdings(&self) -> Result<RawPortfolio, DataSourceError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| DataSourceError::Unavailable(format!("{}: {}", self.path.display(), e)))?;

        let portfolio: RawPortfolio = serde_json::from_slice(&bytes)
            .map_err(|e| DataSourceError::Parse(e.to_string()))?;

        info!("Loaded {} holdings from {}", portfolio.holdings.len(), self.path.display());
        Ok(portfolio)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

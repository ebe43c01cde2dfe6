use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;
use url::Url;

use crate::external::holdings_source::{DataSourceError, HoldingsSource};
use crate::models::RawPortfolio;

/// Pulls the portfolio payload from a market data service over HTTP.
pub struct HttpHoldingsSource {
    url: Url,
    client: Client,
}

impl HttpHoldingsSource {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, DataSourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataSourceError::Unavailable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { url, client })
    }
}

#[async_trait]
impl HoldingsSource for HttpHoldingsSource {
    async fn fetch_holdings(&self) -> Result<RawPortfolio, DataSourceError> {
        let resp = self.client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DataSourceError::Timeout
                } else {
                    DataSourceError::Unavailable(e.to_string())
                }
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DataSourceError::RateLimited);
        }
        if !status.is_success() {
            return Err(DataSourceError::BadResponse(format!("HTTP {}", status)));
        }

        let portfolio = resp
            .json::<RawPortfolio>()
            .await
            .map_err(|e| DataSourceError::Parse(e.to_string()))?;

        info!("Fetched {} holdings from {}", portfolio.holdings.len(), self.url);
        Ok(portfolio)
    }

    fn describe(&self) -> String {
        format!("http:{}", self.url)
    }
}

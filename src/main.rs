use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use portfolio_analyst::app;
use portfolio_analyst::config::{AppConfig, HoldingsSourceConfig};
use portfolio_analyst::external::{FileHoldingsSource, HoldingsSource, HttpHoldingsSource};
use portfolio_analyst::logging::{init_logging, LoggingConfig};
use portfolio_analyst::services::analysis_service::AnalysisService;
use portfolio_analyst::services::llm_service::LlmService;
use portfolio_analyst::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    init_logging(LoggingConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let config = AppConfig::from_env().context("invalid configuration")?;

    let holdings_source: Arc<dyn HoldingsSource> = match &config.holdings_source {
        HoldingsSourceConfig::File(path) => Arc::new(FileHoldingsSource::new(path.clone())),
        HoldingsSourceConfig::Http(url) => Arc::new(
            HttpHoldingsSource::new(url.clone(), config.orchestrator.fetch_timeout)
                .context("failed to create holdings source")?,
        ),
    };
    tracing::info!("Holdings source: {}", holdings_source.describe());

    let llm = Arc::new(LlmService::new(&config.llm, config.orchestrator.generation_timeout));
    match llm.model() {
        Some(model) => tracing::info!("Narrative generation enabled (model: {})", model),
        None => tracing::warn!("Narrative generation is disabled; analysis requests will fail until an API key is configured"),
    }

    let analysis = Arc::new(AnalysisService::new(
        llm,
        config.analytics.clone(),
        config.digest.clone(),
        config.orchestrator.clone(),
    ));

    let state = AppState { holdings_source, analysis };
    let app = app::create_app(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("Portfolio analyst running at http://{}/", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

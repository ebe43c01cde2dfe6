use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::errors::{AnalysisError, AppError};
use crate::external::inline_source::InlineHoldingsSource;
use crate::models::{AnalysisAction, PortfolioMetrics, PortfolioSnapshot};
use crate::routes::analysis::parse_inline_portfolio;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_portfolio).post(run_action))
}

#[derive(Debug, Deserialize)]
pub struct ActionBody {
    pub action: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub action: AnalysisAction,
    pub analysis: String,
    pub metrics: PortfolioMetrics,
}

/// GET /api/portfolio
/// Fresh snapshot of the configured holdings source
async fn get_portfolio(
    State(state): State<AppState>,
) -> Result<Json<PortfolioSnapshot>, AppError> {
    info!("GET /api/portfolio");

    let snapshot = state.analysis.snapshot(state.holdings_source.as_ref()).await?;
    Ok(Json(snapshot))
}

/// `data` carries an inline portfolio only when it has a holdings list.
fn has_holdings(data: &Value) -> bool {
    data.get("holdings").is_some() || data.get("assets").is_some()
}

/// POST /api/portfolio
/// Action-style entry point: analyze, scenario or risk_profile
async fn run_action(
    State(state): State<AppState>,
    payload: Result<Json<ActionBody>, JsonRejection>,
) -> Result<Json<ActionResponse>, AppError> {
    let Json(body) = payload?;
    info!("POST /api/portfolio - action: {}", body.action);

    let action: AnalysisAction = body.action.parse().map_err(AnalysisError::InvalidRequest)?;
    let analysis_type = action.analysis_type();

    let report = match body.data.filter(has_holdings) {
        Some(data) => {
            let source = InlineHoldingsSource::new(parse_inline_portfolio(data)?);
            state.analysis.analyze(&source, analysis_type).await?
        }
        None => state.analysis.analyze(state.holdings_source.as_ref(), analysis_type).await?,
    };

    Ok(Json(ActionResponse {
        action,
        analysis: report.analysis,
        metrics: report.metrics,
    }))
}

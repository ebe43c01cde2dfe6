use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::errors::{AnalysisError, AppError, ValidationError};
use crate::external::inline_source::InlineHoldingsSource;
use crate::models::{AnalysisReport, RawPortfolio};
use crate::services::narrative_service;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(analyze_portfolio))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisBody {
    pub analysis_type: String,
    #[serde(default)]
    pub portfolio_data: Option<Value>,
}

/// Parse a caller-supplied portfolio; anything unreadable is a validation failure.
pub(crate) fn parse_inline_portfolio(data: Value) -> Result<RawPortfolio, AnalysisError> {
    serde_json::from_value(data)
        .map_err(|e| AnalysisError::Validation(ValidationError::Malformed(e.to_string())))
}

/// POST /api/portfolio-analysis
/// Generate a narrative for the supplied portfolio, or for the configured source when none is given
async fn analyze_portfolio(
    State(state): State<AppState>,
    payload: Result<Json<AnalysisBody>, JsonRejection>,
) -> Result<Json<AnalysisReport>, AppError> {
    let Json(body) = payload?;
    info!("POST /api/portfolio-analysis - type: {}", body.analysis_type);

    let analysis_type = narrative_service::parse_analysis_type(&body.analysis_type)?;

    let report = match body.portfolio_data.filter(|v| !v.is_null()) {
        Some(data) => {
            let source = InlineHoldingsSource::new(parse_inline_portfolio(data)?);
            state.analysis.analyze(&source, analysis_type).await?
        }
        None => state.analysis.analyze(state.holdings_source.as_ref(), analysis_type).await?,
    };

    Ok(Json(report))
}

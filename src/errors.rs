use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::external::holdings_source::DataSourceError;
use crate::services::analysis_service::AnalysisStage;

/// Reasons a holdings set cannot become a snapshot.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("portfolio must contain at least one holding")]
    EmptyPortfolio,
    #[error("malformed portfolio data: {0}")]
    Malformed(String),
    #[error("holding {symbol}: {field} must be a finite number")]
    NonFinite { symbol: String, field: &'static str },
    #[error("holding {symbol}: {field} must not be negative (got {value})")]
    Negative { symbol: String, field: &'static str, value: f64 },
    #[error("holding {symbol}: allocation {value}% is outside 0-100")]
    AllocationOutOfRange { symbol: String, value: f64 },
    #[error("holding {symbol}: {message}")]
    UnknownCategory { symbol: String, message: String },
    #[error("holding {symbol}: {message}")]
    UnknownRegion { symbol: String, message: String },
    #[error("duplicate symbol {0}")]
    DuplicateSymbol(String),
    #[error("{0}")]
    UnknownRiskProfile(String),
    #[error("allocations sum to {total:.3}%, expected 100% within {tolerance}")]
    AllocationSum { total: f64, tolerance: f64 },
    #[error("holding {symbol}: allocation {declared:.3}% diverges from value-implied {implied:.3}%")]
    AllocationMismatch { symbol: String, declared: f64, implied: f64 },
    #[error("total portfolio value must be positive")]
    ZeroTotalValue,
}

/// Failures of the text-generation collaborator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("text generation is disabled")]
    Disabled,
    #[error("text generation timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("rate limited by provider")]
    RateLimited,
    #[error("provider error: {0}")]
    Api(String),
    #[error("content policy rejection: {0}")]
    ContentPolicy(String),
    #[error("malformed provider response: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    /// A missing client or a policy refusal gives the same answer on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GenerationError::Disabled | GenerationError::ContentPolicy(_))
    }
}

/// Terminal failure of one analysis request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    #[error("invalid portfolio data: {0}")]
    Validation(#[from] ValidationError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("portfolio data unavailable: {0}")]
    DataSource(#[from] DataSourceError),
    #[error("narrative generation failed: {0}")]
    Generation(#[from] GenerationError),
}

impl AnalysisError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Stage of the pipeline that produced this error.
    pub fn stage(&self) -> AnalysisStage {
        match self {
            AnalysisError::DataSource(_) => AnalysisStage::Fetching,
            AnalysisError::Validation(_) => AnalysisStage::Computing,
            AnalysisError::InvalidRequest(_) => AnalysisStage::Summarizing,
            AnalysisError::Generation(_) => AnalysisStage::Generating,
        }
    }
}

/// HTTP-facing error.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Analysis(#[from] AnalysisError),
    #[error("Malformed request body: {0}")]
    BadBody(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadBody(rejection.body_text())
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadBody(_) => StatusCode::BAD_REQUEST,
            AppError::Analysis(e) => match e {
                AnalysisError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                AnalysisError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                AnalysisError::DataSource(DataSourceError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
                AnalysisError::DataSource(_) => StatusCode::BAD_GATEWAY,
                AnalysisError::Generation(GenerationError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
                AnalysisError::Generation(GenerationError::Disabled) => StatusCode::SERVICE_UNAVAILABLE,
                AnalysisError::Generation(GenerationError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
                AnalysisError::Generation(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let stage = match &self {
            AppError::Analysis(e) => e.stage().to_string(),
            AppError::BadBody(_) => "request".to_string(),
        };
        if status.is_server_error() {
            error!("Request failed ({}) during {}: {}", status, stage, self);
        } else {
            warn!("Request rejected ({}) during {}: {}", status, stage, self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

use std::sync::Arc;

use crate::external::holdings_source::HoldingsSource;
use crate::services::analysis_service::AnalysisService;

#[derive(Clone)]
pub struct AppState {
    pub holdings_source: Arc<dyn HoldingsSource>,
    pub analysis: Arc<AnalysisService>,
}

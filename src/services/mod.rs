pub mod analysis_service;
pub mod llm_service;
pub mod metrics_service;
pub mod narrative_service;
pub mod snapshot_service;

mod holding;
mod narrative;
mod portfolio;

pub use holding::{AssetCategory, Holding, RawHolding, Region};
pub use narrative::{AnalysisAction, AnalysisReport, AnalysisType, HoldingLine, NarrativeRequest, SnapshotDigest};
pub use portfolio::{
    CategoryAllocation, PortfolioMetrics, PortfolioSnapshot, RawPortfolio, RegionAllocation,
    RiskProfile, VolatilityMethod,
};

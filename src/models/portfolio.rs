use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::holding::{AssetCategory, Holding, RawHolding, Region};

/// Investor risk tolerance attached to a portfolio.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

impl RiskProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskProfile::Conservative => "conservative",
            RiskProfile::Moderate => "moderate",
            RiskProfile::Aggressive => "aggressive",
        }
    }
}

impl FromStr for RiskProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conservative" => Ok(RiskProfile::Conservative),
            "moderate" => Ok(RiskProfile::Moderate),
            "aggressive" => Ok(RiskProfile::Aggressive),
            other => Err(format!("unknown risk profile '{}'", other)),
        }
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Portfolio payload as returned by a holdings data source.
///
/// Extra fields emitted by the feed (precomputed totals, allocations) are ignored;
/// everything derived is recomputed from the holdings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawPortfolio {
    #[serde(alias = "assets")]
    pub holdings: Vec<RawHolding>,
    #[serde(default, alias = "risk_profile")]
    pub risk_profile: Option<String>,
    /// Periodic portfolio returns in percent, oldest first
    #[serde(default, alias = "return_history")]
    pub return_history: Option<Vec<f64>>,
}

/// How the volatility figure was derived.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityMethod {
    /// Allocation-weighted population standard deviation of holding returns at a
    /// single instant. A dispersion proxy, not a time-series volatility.
    #[default]
    CrossSectional,
    /// Population standard deviation of the portfolio's own return history.
    Historical,
}

impl FromStr for VolatilityMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cross_sectional" | "cross-sectional" => Ok(VolatilityMethod::CrossSectional),
            "historical" => Ok(VolatilityMethod::Historical),
            other => Err(format!("unknown volatility method '{}'", other)),
        }
    }
}

/// Aggregate metrics for a set of holdings.
///
/// Return and volatility are in percent, same unit as `Holding::change_pct`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioMetrics {
    pub total_value: f64,
    pub portfolio_return: f64,
    pub volatility: f64,
    pub volatility_method: VolatilityMethod,
    /// Zero when volatility is zero
    pub sharpe_ratio: f64,
    pub num_assets: usize,
}

pub type CategoryAllocation = BTreeMap<AssetCategory, f64>;
pub type RegionAllocation = BTreeMap<Region, f64>;

/// Immutable view of a portfolio at one instant, with its derived analytics.
///
/// Only `snapshot_service::build_snapshot` constructs one; there are no setters.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    id: Uuid,
    total_value: f64,
    holdings: Vec<Holding>,
    risk_profile: RiskProfile,
    as_of: DateTime<Utc>,
    metrics: PortfolioMetrics,
    category_allocation: CategoryAllocation,
    region_allocation: RegionAllocation,
}

impl PortfolioSnapshot {
    pub(crate) fn new(
        holdings: Vec<Holding>,
        risk_profile: RiskProfile,
        metrics: PortfolioMetrics,
        category_allocation: CategoryAllocation,
        region_allocation: RegionAllocation,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            total_value: metrics.total_value,
            holdings,
            risk_profile,
            as_of: Utc::now(),
            metrics,
            category_allocation,
            region_allocation,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn total_value(&self) -> f64 {
        self.total_value
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn risk_profile(&self) -> RiskProfile {
        self.risk_profile
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    pub fn metrics(&self) -> &PortfolioMetrics {
        &self.metrics
    }

    pub fn category_allocation(&self) -> &CategoryAllocation {
        &self.category_allocation
    }

    pub fn region_allocation(&self) -> &RegionAllocation {
        &self.region_allocation
    }
}

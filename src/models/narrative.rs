use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::portfolio::{CategoryAllocation, PortfolioMetrics, RegionAllocation, RiskProfile};

/// Framing requested for the generated narrative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    General,
    Risk,
    Rebalance,
    Scenario,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::General => "general",
            AnalysisType::Risk => "risk",
            AnalysisType::Rebalance => "rebalance",
            AnalysisType::Scenario => "scenario",
        }
    }
}

impl FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "general" => Ok(AnalysisType::General),
            "risk" => Ok(AnalysisType::Risk),
            "rebalance" => Ok(AnalysisType::Rebalance),
            "scenario" => Ok(AnalysisType::Scenario),
            other => Err(format!("unsupported analysis type '{}'", other)),
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action tokens accepted by the action-style entry point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisAction {
    Analyze,
    Scenario,
    RiskProfile,
}

impl AnalysisAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisAction::Analyze => "analyze",
            AnalysisAction::Scenario => "scenario",
            AnalysisAction::RiskProfile => "risk_profile",
        }
    }

    /// Narrative flavor each action dispatches to.
    pub fn analysis_type(&self) -> AnalysisType {
        match self {
            AnalysisAction::Analyze => AnalysisType::General,
            AnalysisAction::Scenario => AnalysisType::Scenario,
            AnalysisAction::RiskProfile => AnalysisType::Risk,
        }
    }
}

impl FromStr for AnalysisAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "analyze" => Ok(AnalysisAction::Analyze),
            "scenario" => Ok(AnalysisAction::Scenario),
            "risk_profile" => Ok(AnalysisAction::RiskProfile),
            other => Err(format!("invalid action '{}'", other)),
        }
    }
}

/// One holding as it appears in a digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HoldingLine {
    pub symbol: String,
    pub name: String,
    pub category: String,
    pub region: String,
    pub allocation_pct: f64,
    pub value: f64,
    pub change_pct: f64,
}

/// Bounded summary of a snapshot handed to the text generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDigest {
    pub risk_profile: RiskProfile,
    pub metrics: PortfolioMetrics,
    pub category_allocation: CategoryAllocation,
    pub region_allocation: RegionAllocation,
    /// Every holding for small portfolios, the largest ones otherwise
    pub holdings: Vec<HoldingLine>,
    /// Holdings left out of `holdings`
    pub omitted_holdings: usize,
}

/// Everything needed for one call to the text generator.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeRequest {
    pub analysis_type: AnalysisType,
    pub digest: SnapshotDigest,
    pub system_instruction: String,
    pub prompt: String,
}

/// Successful analysis: narrative plus the numbers it was generated from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub snapshot_id: Uuid,
    pub analysis_type: AnalysisType,
    pub analysis: String,
    pub metrics: PortfolioMetrics,
    pub category_allocation: CategoryAllocation,
    pub region_allocation: RegionAllocation,
    pub as_of: DateTime<Utc>,
}

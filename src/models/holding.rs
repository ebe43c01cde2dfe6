use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Asset class of a holding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    Stock,
    Bond,
    Crypto,
    Cash,
}

impl AssetCategory {
    pub const ALL: [AssetCategory; 4] = [
        AssetCategory::Stock,
        AssetCategory::Bond,
        AssetCategory::Crypto,
        AssetCategory::Cash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Stock => "stock",
            AssetCategory::Bond => "bond",
            AssetCategory::Crypto => "crypto",
            AssetCategory::Cash => "cash",
        }
    }
}

impl FromStr for AssetCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stock" => Ok(AssetCategory::Stock),
            "bond" => Ok(AssetCategory::Bond),
            "crypto" => Ok(AssetCategory::Crypto),
            "cash" => Ok(AssetCategory::Cash),
            other => Err(format!("unknown asset category '{}'", other)),
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic exposure of a holding.
///
/// Serialized with the casing the market data feed uses ("US", "Developed", ...).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Region {
    #[serde(rename = "US")]
    Us,
    Developed,
    Emerging,
    Global,
}

impl Region {
    pub const ALL: [Region; 4] = [Region::Us, Region::Developed, Region::Emerging, Region::Global];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Us => "US",
            Region::Developed => "Developed",
            Region::Emerging => "Emerging",
            Region::Global => "Global",
        }
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "us" => Ok(Region::Us),
            "developed" => Ok(Region::Developed),
            "emerging" => Ok(Region::Emerging),
            "global" => Ok(Region::Global),
            other => Err(format!("unknown region '{}'", other)),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A holding record as delivered by a data source, before validation.
///
/// Category and region stay as strings here so an unknown value surfaces as a
/// validation failure instead of a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawHolding {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "asset_type")]
    pub category: String,
    pub region: String,
    #[serde(alias = "allocation", alias = "allocation_pct")]
    pub allocation_pct: f64,
    pub value: f64,
    #[serde(alias = "current_price")]
    pub price: f64,
    #[serde(alias = "change_percent", alias = "change_pct")]
    pub change_pct: f64,
}

/// A single validated position.
///
/// Percentages are expressed in percent (e.g., 15.0 for 15%).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub symbol: String,
    pub name: String,
    pub category: AssetCategory,
    pub region: Region,

    /// Share of total portfolio value, 0-100
    pub allocation_pct: f64,

    /// Market value in portfolio currency
    pub value: f64,

    /// Last known unit price
    pub price: f64,

    /// Period return, signed
    pub change_pct: f64,
}

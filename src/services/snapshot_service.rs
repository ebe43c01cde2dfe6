use std::collections::HashSet;

use tracing::{info, warn};

use crate::config::{AllocationPolicy, AnalyticsConfig};
use crate::errors::ValidationError;
use crate::models::{
    AssetCategory, Holding, PortfolioSnapshot, RawHolding, RawPortfolio, Region, RiskProfile,
};
use crate::services::metrics_service;

/// Validate a raw portfolio and derive its immutable snapshot.
///
/// Pure apart from the snapshot id and `as_of` timestamp: the same input always
/// yields the same holdings, metrics and allocations.
pub fn build_snapshot(
    raw: RawPortfolio,
    config: &AnalyticsConfig,
) -> Result<PortfolioSnapshot, ValidationError> {
    if raw.holdings.is_empty() {
        return Err(ValidationError::EmptyPortfolio);
    }

    let risk_profile = match raw.risk_profile.as_deref() {
        Some(p) if !p.trim().is_empty() => p.parse::<RiskProfile>().map_err(ValidationError::UnknownRiskProfile)?,
        _ => RiskProfile::default(),
    };

    let mut seen = HashSet::new();
    let mut holdings = Vec::with_capacity(raw.holdings.len());
    for raw_holding in raw.holdings {
        if !seen.insert(raw_holding.symbol.clone()) {
            return Err(ValidationError::DuplicateSymbol(raw_holding.symbol));
        }
        holdings.push(validate_holding(raw_holding)?);
    }

    let total_value = metrics_service::total_value(&holdings);
    if total_value <= 0.0 {
        return Err(ValidationError::ZeroTotalValue);
    }

    check_allocations(&mut holdings, total_value, config)?;

    let metrics = metrics_service::compute_metrics(&holdings, raw.return_history.as_deref(), config);
    let category_allocation = metrics_service::category_allocation(&holdings);
    let region_allocation = metrics_service::region_allocation(&holdings);

    let snapshot = PortfolioSnapshot::new(
        holdings,
        risk_profile,
        metrics,
        category_allocation,
        region_allocation,
    );

    info!(
        "Built snapshot {} ({} holdings, total value {:.2})",
        snapshot.id(),
        snapshot.holdings().len(),
        snapshot.total_value()
    );

    Ok(snapshot)
}

fn validate_holding(raw: RawHolding) -> Result<Holding, ValidationError> {
    for (field, value) in [
        ("value", raw.value),
        ("price", raw.price),
        ("allocation", raw.allocation_pct),
        ("change", raw.change_pct),
    ] {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite { symbol: raw.symbol, field });
        }
    }

    for (field, value) in [("value", raw.value), ("price", raw.price)] {
        if value < 0.0 {
            return Err(ValidationError::Negative { symbol: raw.symbol, field, value });
        }
    }

    if !(0.0..=100.0).contains(&raw.allocation_pct) {
        return Err(ValidationError::AllocationOutOfRange {
            symbol: raw.symbol,
            value: raw.allocation_pct,
        });
    }

    let category = match raw.category.parse::<AssetCategory>() {
        Ok(c) => c,
        Err(message) => return Err(ValidationError::UnknownCategory { symbol: raw.symbol, message }),
    };
    let region = match raw.region.parse::<Region>() {
        Ok(r) => r,
        Err(message) => return Err(ValidationError::UnknownRegion { symbol: raw.symbol, message }),
    };

    Ok(Holding {
        symbol: raw.symbol,
        name: raw.name,
        category,
        region,
        allocation_pct: raw.allocation_pct,
        value: raw.value,
        price: raw.price,
        change_pct: raw.change_pct,
    })
}

/// Enforce that allocations sum to 100 and track each holding's share of value.
fn check_allocations(
    holdings: &mut [Holding],
    total_value: f64,
    config: &AnalyticsConfig,
) -> Result<(), ValidationError> {
    let tolerance = config.allocation_tolerance_pct;

    if config.allocation_policy == AllocationPolicy::Reconcile {
        for h in holdings.iter_mut() {
            let implied = h.value / total_value * 100.0;
            if (h.allocation_pct - implied).abs() > tolerance {
                warn!(
                    "Reconciling {} allocation from {:.3}% to value-implied {:.3}%",
                    h.symbol, h.allocation_pct, implied
                );
                h.allocation_pct = implied;
            }
        }
    }

    let allocation_sum: f64 = holdings.iter().map(|h| h.allocation_pct).sum();
    if (allocation_sum - 100.0).abs() > tolerance {
        return Err(ValidationError::AllocationSum { total: allocation_sum, tolerance });
    }

    for h in holdings.iter() {
        let implied = h.value / total_value * 100.0;
        if (h.allocation_pct - implied).abs() > tolerance {
            return Err(ValidationError::AllocationMismatch {
                symbol: h.symbol.clone(),
                declared: h.allocation_pct,
                implied,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VolatilityMethod;

    fn raw(symbol: &str, category: &str, region: &str, allocation_pct: f64, value: f64, change_pct: f64) -> RawHolding {
        RawHolding {
            symbol: symbol.to_string(),
            name: format!("{} Holding", symbol),
            category: category.to_string(),
            region: region.to_string(),
            allocation_pct,
            value,
            price: 10.0,
            change_pct,
        }
    }

    fn portfolio(holdings: Vec<RawHolding>) -> RawPortfolio {
        RawPortfolio {
            holdings,
            risk_profile: Some("moderate".to_string()),
            return_history: None,
        }
    }

    fn balanced() -> RawPortfolio {
        portfolio(vec![
            raw("VTI", "stock", "US", 50.0, 5000.0, 2.0),
            raw("BND", "bond", "US", 30.0, 3000.0, -0.5),
            raw("VXUS", "stock", "Developed", 20.0, 2000.0, 1.0),
        ])
    }

    #[test]
    fn test_builds_valid_snapshot() {
        let snapshot = build_snapshot(balanced(), &AnalyticsConfig::default()).unwrap();

        assert_eq!(snapshot.holdings().len(), 3);
        assert_eq!(snapshot.holdings()[0].symbol, "VTI");
        assert_eq!(snapshot.holdings()[2].symbol, "VXUS");
        assert_eq!(snapshot.total_value(), 10000.0);
        assert_eq!(snapshot.metrics().total_value, snapshot.total_value());
        assert_eq!(snapshot.risk_profile(), RiskProfile::Moderate);
        assert_eq!(snapshot.category_allocation()[&AssetCategory::Stock], 70.0);
        assert_eq!(snapshot.region_allocation()[&Region::Us], 80.0);
        assert_eq!(snapshot.metrics().volatility_method, VolatilityMethod::CrossSectional);
    }

    #[test]
    fn test_rejects_empty_portfolio() {
        let result = build_snapshot(portfolio(vec![]), &AnalyticsConfig::default());
        assert_eq!(result.unwrap_err(), ValidationError::EmptyPortfolio);
    }

    #[test]
    fn test_rejects_negative_value_and_price() {
        let mut p = balanced();
        p.holdings[1].value = -1.0;
        assert!(matches!(
            build_snapshot(p, &AnalyticsConfig::default()),
            Err(ValidationError::Negative { field: "value", .. })
        ));

        let mut p = balanced();
        p.holdings[0].price = -5.0;
        assert!(matches!(
            build_snapshot(p, &AnalyticsConfig::default()),
            Err(ValidationError::Negative { field: "price", .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_category_and_region() {
        let mut p = balanced();
        p.holdings[0].category = "real_estate".to_string();
        assert!(matches!(
            build_snapshot(p, &AnalyticsConfig::default()),
            Err(ValidationError::UnknownCategory { .. })
        ));

        let mut p = balanced();
        p.holdings[2].region = "Antarctica".to_string();
        assert!(matches!(
            build_snapshot(p, &AnalyticsConfig::default()),
            Err(ValidationError::UnknownRegion { .. })
        ));
    }

    #[test]
    fn test_rejects_allocation_sum_off_hundred() {
        let p = portfolio(vec![
            raw("AAPL", "stock", "US", 15.0, 18862.58, 1.8),
            raw("CASH", "cash", "US", 10.0, 12575.05, 0.0),
        ]);
        assert!(matches!(
            build_snapshot(p, &AnalyticsConfig::default()),
            Err(ValidationError::AllocationSum { .. })
        ));
    }

    #[test]
    fn test_tolerates_small_allocation_drift() {
        let mut p = balanced();
        p.holdings[0].allocation_pct = 50.3;
        p.holdings[1].allocation_pct = 29.8;
        assert!(build_snapshot(p, &AnalyticsConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_allocation_value_mismatch() {
        // Sums to 100 but VTI's declared share disagrees with its value.
        let mut p = balanced();
        p.holdings[0].allocation_pct = 40.0;
        p.holdings[1].allocation_pct = 40.0;
        let err = build_snapshot(p, &AnalyticsConfig::default()).unwrap_err();
        assert!(matches!(err, ValidationError::AllocationMismatch { ref symbol, .. } if symbol == "VTI"));
    }

    #[test]
    fn test_reconcile_policy_rewrites_allocations() {
        let mut p = balanced();
        p.holdings[0].allocation_pct = 40.0;
        p.holdings[1].allocation_pct = 40.0;
        let config = AnalyticsConfig {
            allocation_policy: AllocationPolicy::Reconcile,
            ..AnalyticsConfig::default()
        };

        let snapshot = build_snapshot(p, &config).unwrap();
        assert!((snapshot.holdings()[0].allocation_pct - 50.0).abs() < 1e-9);
        assert!((snapshot.holdings()[1].allocation_pct - 30.0).abs() < 1e-9);
        assert!((snapshot.category_allocation().values().sum::<f64>() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_duplicate_symbols() {
        let mut p = balanced();
        p.holdings[2].symbol = "VTI".to_string();
        assert_eq!(
            build_snapshot(p, &AnalyticsConfig::default()).unwrap_err(),
            ValidationError::DuplicateSymbol("VTI".to_string())
        );
    }

    #[test]
    fn test_rejects_non_finite_numbers() {
        let mut p = balanced();
        p.holdings[0].change_pct = f64::NAN;
        assert!(matches!(
            build_snapshot(p, &AnalyticsConfig::default()),
            Err(ValidationError::NonFinite { field: "change", .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_risk_profile() {
        let mut p = balanced();
        p.risk_profile = Some("reckless".to_string());
        assert!(matches!(
            build_snapshot(p, &AnalyticsConfig::default()),
            Err(ValidationError::UnknownRiskProfile(_))
        ));
    }

    #[test]
    fn test_missing_risk_profile_defaults_to_moderate() {
        let mut p = balanced();
        p.risk_profile = None;
        let snapshot = build_snapshot(p, &AnalyticsConfig::default()).unwrap();
        assert_eq!(snapshot.risk_profile(), RiskProfile::Moderate);
    }

    #[test]
    fn test_rejects_zero_total_value() {
        let p = portfolio(vec![raw("CASH", "cash", "US", 100.0, 0.0, 0.0)]);
        assert_eq!(
            build_snapshot(p, &AnalyticsConfig::default()).unwrap_err(),
            ValidationError::ZeroTotalValue
        );
    }

    #[test]
    fn test_construction_is_deterministic_apart_from_identity() {
        let config = AnalyticsConfig::default();
        let a = build_snapshot(balanced(), &config).unwrap();
        let b = build_snapshot(balanced(), &config).unwrap();

        assert_eq!(a.metrics(), b.metrics());
        assert_eq!(a.category_allocation(), b.category_allocation());
        assert_eq!(a.region_allocation(), b.region_allocation());
        assert_eq!(a.holdings(), b.holdings());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_single_holding_snapshot() {
        let p = portfolio(vec![raw("VTI", "stock", "US", 100.0, 1000.0, 4.0)]);
        let snapshot = build_snapshot(p, &AnalyticsConfig::default()).unwrap();

        assert_eq!(snapshot.metrics().volatility, 0.0);
        assert_eq!(snapshot.metrics().sharpe_ratio, 0.0);
        assert_eq!(snapshot.metrics().num_assets, 1);
    }
}

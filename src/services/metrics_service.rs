use tracing::warn;

use crate::config::AnalyticsConfig;
use crate::models::{
    CategoryAllocation, Holding, PortfolioMetrics, RegionAllocation, VolatilityMethod,
};

/// Compute aggregate metrics for a set of holdings.
///
/// Total over any input: an empty set or zero allocations produce zeros rather
/// than NaN. `return_history` is only consulted for `VolatilityMethod::Historical`.
pub fn compute_metrics(
    holdings: &[Holding],
    return_history: Option<&[f64]>,
    config: &AnalyticsConfig,
) -> PortfolioMetrics {
    let total_value = total_value(holdings);
    let portfolio_return = weighted_return(holdings);

    let (volatility, volatility_method) = match (config.volatility_method, return_history) {
        (VolatilityMethod::Historical, Some(series)) if series.len() >= 2 => {
            (historical_volatility(series), VolatilityMethod::Historical)
        }
        (VolatilityMethod::Historical, _) => {
            warn!("Historical volatility requested without at least two return observations, using cross-sectional dispersion");
            (
                cross_sectional_volatility(holdings, portfolio_return),
                VolatilityMethod::CrossSectional,
            )
        }
        (VolatilityMethod::CrossSectional, _) => (
            cross_sectional_volatility(holdings, portfolio_return),
            VolatilityMethod::CrossSectional,
        ),
    };

    PortfolioMetrics {
        total_value,
        portfolio_return,
        volatility,
        volatility_method,
        sharpe_ratio: sharpe_ratio(portfolio_return, volatility, config.risk_free_rate_pct),
        num_assets: holdings.len(),
    }
}

pub fn total_value(holdings: &[Holding]) -> f64 {
    holdings.iter().map(|h| h.value).sum()
}

/// Normalized allocation weights, one per holding.
///
/// Equal to `allocation_pct / 100` whenever allocations sum to 100.
fn weights(holdings: &[Holding]) -> Option<Vec<f64>> {
    let allocation_sum: f64 = holdings.iter().map(|h| h.allocation_pct).sum();
    if allocation_sum <= f64::EPSILON {
        return None;
    }

    Some(holdings.iter().map(|h| h.allocation_pct / allocation_sum).collect())
}

/// Allocation-weighted average of holding returns, in percent.
pub fn weighted_return(holdings: &[Holding]) -> f64 {
    match weights(holdings) {
        Some(w) => holdings
            .iter()
            .zip(w.iter())
            .map(|(h, w)| w * h.change_pct)
            .sum(),
        None => 0.0,
    }
}

/// Allocation-weighted population standard deviation of holding returns.
///
/// This measures how far apart the holdings moved during the period, at one
/// instant. It is not a time-series volatility and is not annualized.
pub fn cross_sectional_volatility(holdings: &[Holding], mean: f64) -> f64 {
    let Some(w) = weights(holdings) else {
        return 0.0;
    };
    // Identical returns have no dispersion; skip the rounding residue of the mean.
    if holdings.windows(2).all(|pair| pair[0].change_pct == pair[1].change_pct) {
        return 0.0;
    }

    let variance: f64 = holdings
        .iter()
        .zip(w.iter())
        .map(|(h, w)| w * (h.change_pct - mean).powi(2))
        .sum();

    variance.max(0.0).sqrt()
}

/// Population standard deviation of a return series.
pub fn historical_volatility(series: &[f64]) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }

    let n = series.len() as f64;
    let mean = series.iter().sum::<f64>() / n;
    let variance = series.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;

    variance.sqrt()
}

/// Relative floor below which volatility counts as zero.
const ZERO_VOLATILITY_TOLERANCE: f64 = 1e-12;

/// Return over volatility, with zero volatility reported as a Sharpe of zero.
pub fn sharpe_ratio(portfolio_return: f64, volatility: f64, risk_free_rate_pct: f64) -> f64 {
    let excess = portfolio_return - risk_free_rate_pct;
    if volatility.abs() <= ZERO_VOLATILITY_TOLERANCE * excess.abs().max(1.0) {
        return 0.0;
    }

    excess / volatility
}

/// Sum of allocation percentages per asset category.
pub fn category_allocation(holdings: &[Holding]) -> CategoryAllocation {
    let mut allocation = CategoryAllocation::new();
    for h in holdings {
        *allocation.entry(h.category).or_insert(0.0) += h.allocation_pct;
    }
    allocation
}

/// Sum of allocation percentages per region.
pub fn region_allocation(holdings: &[Holding]) -> RegionAllocation {
    let mut allocation = RegionAllocation::new();
    for h in holdings {
        *allocation.entry(h.region).or_insert(0.0) += h.allocation_pct;
    }
    allocation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetCategory, Region};

    fn holding(
        symbol: &str,
        category: AssetCategory,
        region: Region,
        allocation_pct: f64,
        value: f64,
        change_pct: f64,
    ) -> Holding {
        Holding {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            category,
            region,
            allocation_pct,
            value,
            price: 1.0,
            change_pct,
        }
    }

    fn sample_portfolio() -> Vec<Holding> {
        vec![
            holding("AAPL", AssetCategory::Stock, Region::Us, 15.0, 18862.58, 1.8),
            holding("MSFT", AssetCategory::Stock, Region::Us, 12.0, 15090.06, 2.4),
            holding("GOOGL", AssetCategory::Stock, Region::Us, 8.0, 10060.04, -0.8),
            holding("BTC", AssetCategory::Crypto, Region::Global, 5.0, 6287.53, 12.1),
            holding("TLT", AssetCategory::Bond, Region::Us, 15.0, 18862.58, -0.3),
            holding("VEA", AssetCategory::Stock, Region::Developed, 20.0, 25150.1, 1.5),
            holding("VWO", AssetCategory::Stock, Region::Emerging, 15.0, 18862.58, 4.2),
            holding("CASH", AssetCategory::Cash, Region::Us, 10.0, 12575.05, 0.0),
        ]
    }

    #[test]
    fn test_sample_portfolio_metrics() {
        let holdings = sample_portfolio();
        let metrics = compute_metrics(&holdings, None, &AnalyticsConfig::default());

        assert!((metrics.total_value - 125750.52).abs() < 1e-6);
        assert!((metrics.portfolio_return - 1.984).abs() < 1e-9);
        assert!((metrics.volatility - 2.778874592348492).abs() < 1e-9);
        assert!((metrics.sharpe_ratio - 0.7139580913305178).abs() < 1e-9);
        assert_eq!(metrics.num_assets, 8);
        assert_eq!(metrics.volatility_method, VolatilityMethod::CrossSectional);
    }

    #[test]
    fn test_total_value_is_exact_sum() {
        let holdings = sample_portfolio();
        let expected: f64 = holdings.iter().map(|h| h.value).sum();
        assert_eq!(total_value(&holdings), expected);
    }

    #[test]
    fn test_two_holding_weighted_return() {
        // Allocations need not reach 100 here; weights are normalized.
        let holdings = vec![
            holding("AAPL", AssetCategory::Stock, Region::Us, 15.0, 18862.58, 1.8),
            holding("CASH", AssetCategory::Cash, Region::Us, 10.0, 12575.05, 0.0),
        ];

        let r = weighted_return(&holdings);
        let manual = (15.0 * 1.8 + 10.0 * 0.0) / 25.0;
        assert!((r - manual).abs() < 0.001);
        assert!((r - 1.08).abs() < 0.001);
    }

    #[test]
    fn test_single_holding_has_zero_volatility_and_sharpe() {
        let holdings = vec![holding("VTI", AssetCategory::Stock, Region::Us, 100.0, 5000.0, 3.2)];
        let metrics = compute_metrics(&holdings, None, &AnalyticsConfig::default());

        assert!((metrics.portfolio_return - 3.2).abs() < 1e-12);
        assert_eq!(metrics.volatility, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_all_cash_portfolio() {
        let holdings = vec![
            holding("USD", AssetCategory::Cash, Region::Us, 60.0, 600.0, 0.0),
            holding("EUR", AssetCategory::Cash, Region::Developed, 40.0, 400.0, 0.0),
        ];
        let metrics = compute_metrics(&holdings, None, &AnalyticsConfig::default());

        assert_eq!(metrics.portfolio_return, 0.0);
        assert_eq!(metrics.volatility, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_identical_returns_have_zero_volatility_and_sharpe() {
        // Weighted mean of 1.7 lands a few ulps off 1.7 with these weights.
        let holdings = vec![
            holding("A", AssetCategory::Stock, Region::Us, 15.0, 150.0, 1.7),
            holding("B", AssetCategory::Bond, Region::Us, 12.0, 120.0, 1.7),
            holding("C", AssetCategory::Stock, Region::Developed, 73.0, 730.0, 1.7),
        ];
        let metrics = compute_metrics(&holdings, None, &AnalyticsConfig::default());

        assert_eq!(metrics.volatility, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert!((metrics.portfolio_return - 1.7).abs() < 1e-12);
    }

    #[test]
    fn test_rounding_residue_volatility_gives_zero_sharpe() {
        assert_eq!(sharpe_ratio(1.7, 2.220446049250313e-16, 0.0), 0.0);
        assert_eq!(sharpe_ratio(-4.0, 1e-15, 0.0), 0.0);
        assert!((sharpe_ratio(1.0, 1e-6, 0.0) - 1e6).abs() < 1e-3);
    }

    #[test]
    fn test_empty_holdings_do_not_produce_nan() {
        let metrics = compute_metrics(&[], None, &AnalyticsConfig::default());
        assert_eq!(metrics.total_value, 0.0);
        assert_eq!(metrics.portfolio_return, 0.0);
        assert_eq!(metrics.volatility, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert_eq!(metrics.num_assets, 0);
    }

    #[test]
    fn test_allocations_partition_hundred() {
        let holdings = sample_portfolio();

        let categories = category_allocation(&holdings);
        let regions = region_allocation(&holdings);

        assert!((categories.values().sum::<f64>() - 100.0).abs() < 1e-9);
        assert!((regions.values().sum::<f64>() - 100.0).abs() < 1e-9);
        assert_eq!(categories[&AssetCategory::Stock], 70.0);
        assert_eq!(categories[&AssetCategory::Bond], 15.0);
        assert_eq!(categories[&AssetCategory::Crypto], 5.0);
        assert_eq!(categories[&AssetCategory::Cash], 10.0);
        assert_eq!(regions[&Region::Us], 60.0);
        assert_eq!(regions[&Region::Developed], 20.0);
        assert_eq!(regions[&Region::Emerging], 15.0);
        assert_eq!(regions[&Region::Global], 5.0);
    }

    #[test]
    fn test_historical_volatility_when_configured() {
        let holdings = sample_portfolio();
        let config = AnalyticsConfig {
            volatility_method: VolatilityMethod::Historical,
            ..AnalyticsConfig::default()
        };
        let history = [1.0, -1.0, 1.0, -1.0];

        let metrics = compute_metrics(&holdings, Some(&history), &config);
        assert_eq!(metrics.volatility_method, VolatilityMethod::Historical);
        assert!((metrics.volatility - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_historical_falls_back_without_series() {
        let holdings = sample_portfolio();
        let config = AnalyticsConfig {
            volatility_method: VolatilityMethod::Historical,
            ..AnalyticsConfig::default()
        };

        let metrics = compute_metrics(&holdings, Some(&[2.0]), &config);
        assert_eq!(metrics.volatility_method, VolatilityMethod::CrossSectional);
        assert!((metrics.volatility - 2.778874592348492).abs() < 1e-9);
    }

    #[test]
    fn test_sharpe_uses_risk_free_rate() {
        assert!((sharpe_ratio(5.0, 2.0, 1.0) - 2.0).abs() < 1e-12);
        assert_eq!(sharpe_ratio(5.0, 0.0, 1.0), 0.0);
    }
}

use std::cmp::Ordering;

use tracing::{info, warn};

use crate::config::DigestConfig;
use crate::errors::AnalysisError;
use crate::models::{
    AnalysisType, HoldingLine, NarrativeRequest, PortfolioSnapshot, SnapshotDigest,
    VolatilityMethod,
};

/// Validate a caller-supplied analysis type token.
pub fn parse_analysis_type(raw: &str) -> Result<AnalysisType, AnalysisError> {
    raw.parse().map_err(AnalysisError::InvalidRequest)
}

/// Compress a snapshot into a bounded prompt plus framing instruction.
pub fn build_narrative_request(
    snapshot: &PortfolioSnapshot,
    analysis_type: AnalysisType,
    config: &DigestConfig,
) -> Result<NarrativeRequest, AnalysisError> {
    let mut digest = build_digest(snapshot, config);
    let mut prompt = render_prompt(&digest);

    // Shed the smallest listed holdings until the prompt fits.
    while prompt.chars().count() > config.max_chars && !digest.holdings.is_empty() {
        digest.holdings.pop();
        digest.omitted_holdings += 1;
        prompt = render_prompt(&digest);
    }

    let prompt_chars = prompt.chars().count();
    if prompt_chars > config.max_chars {
        warn!("Digest of {} chars exceeds ceiling of {}", prompt_chars, config.max_chars);
        return Err(AnalysisError::invalid_request(format!(
            "portfolio summary needs {} characters, ceiling is {}",
            prompt_chars, config.max_chars
        )));
    }

    info!(
        "Built {} narrative request ({} holdings listed, {} omitted, {} chars)",
        analysis_type,
        digest.holdings.len(),
        digest.omitted_holdings,
        prompt_chars
    );

    Ok(NarrativeRequest {
        analysis_type,
        system_instruction: system_instruction(&digest, analysis_type),
        digest,
        prompt,
    })
}

fn build_digest(snapshot: &PortfolioSnapshot, config: &DigestConfig) -> SnapshotDigest {
    let holdings = snapshot.holdings();

    // Largest first, so shedding from the tail drops the smallest positions.
    let mut listed: Vec<_> = holdings.iter().collect();
    listed.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));
    if listed.len() > config.holdings_threshold {
        listed.truncate(config.top_holdings);
    }

    SnapshotDigest {
        risk_profile: snapshot.risk_profile(),
        metrics: snapshot.metrics().clone(),
        category_allocation: snapshot.category_allocation().clone(),
        region_allocation: snapshot.region_allocation().clone(),
        omitted_holdings: holdings.len() - listed.len(),
        holdings: listed
            .into_iter()
            .map(|h| HoldingLine {
                symbol: h.symbol.clone(),
                name: h.name.clone(),
                category: h.category.to_string(),
                region: h.region.to_string(),
                allocation_pct: h.allocation_pct,
                value: h.value,
                change_pct: h.change_pct,
            })
            .collect(),
    }
}

fn render_prompt(digest: &SnapshotDigest) -> String {
    let m = &digest.metrics;
    let volatility_label = match m.volatility_method {
        VolatilityMethod::CrossSectional => "Return Dispersion Across Holdings",
        VolatilityMethod::Historical => "Historical Volatility",
    };

    let asset_lines = digest
        .category_allocation
        .iter()
        .map(|(category, pct)| format!("- {}: {:.1}%", category, pct))
        .collect::<Vec<_>>()
        .join("\n");

    let region_lines = digest
        .region_allocation
        .iter()
        .map(|(region, pct)| format!("- {}: {:.1}%", region, pct))
        .collect::<Vec<_>>()
        .join("\n");

    let mut sections = vec![
        format!(
            "Analyze this portfolio snapshot.\n\nPORTFOLIO OVERVIEW:\n\
             - Total Value: ${:.2}\n\
             - Number of Holdings: {}\n\
             - Risk Profile: {}\n\
             - Period Return (allocation-weighted): {:+.2}%\n\
             - {}: {:.2}%\n\
             - Sharpe Ratio: {:.2}",
            m.total_value,
            m.num_assets,
            digest.risk_profile,
            m.portfolio_return,
            volatility_label,
            m.volatility,
            m.sharpe_ratio
        ),
        format!("ASSET ALLOCATION:\n{}", asset_lines),
        format!("REGIONAL ALLOCATION:\n{}", region_lines),
    ];

    if !digest.holdings.is_empty() {
        let holding_lines = digest
            .holdings
            .iter()
            .map(|h| {
                format!(
                    "- {} ({}) {}/{}: {:.1}% | ${:.2} | {:+.2}%",
                    h.symbol, h.name, h.category, h.region, h.allocation_pct, h.value, h.change_pct
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("HOLDINGS:\n{}", holding_lines));
    }

    let mut prompt = sections.join("\n\n");
    if digest.omitted_holdings > 0 {
        prompt.push_str(&format!(
            "\n({} smaller holdings not listed)",
            digest.omitted_holdings
        ));
    }
    prompt.push('\n');
    prompt
}

fn framing(analysis_type: AnalysisType) -> &'static str {
    match analysis_type {
        AnalysisType::General => {
            "Give a balanced overview of performance, diversification and risk."
        }
        AnalysisType::Risk => {
            "Focus on risk: concentration in single holdings or asset classes, how widely returns diverge across holdings, and whether the mix fits the stated risk profile."
        }
        AnalysisType::Rebalance => {
            "Focus on allocation: compare the asset and regional mix with what the stated risk profile usually calls for and describe the shifts that would close the gap."
        }
        AnalysisType::Scenario => {
            "Focus on scenarios: describe how this allocation would likely behave in a broad equity sell-off, a rise in interest rates, and a strong rally."
        }
    }
}

fn system_instruction(digest: &SnapshotDigest, analysis_type: AnalysisType) -> String {
    let asset_mix = digest
        .category_allocation
        .keys()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let regions = digest
        .region_allocation
        .keys()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are an expert AI Portfolio Manager using advanced quantitative analysis. Analyze the provided portfolio data and provide specific, actionable insights.

Portfolio Context:
- Total Value: ${:.2}
- Asset Mix: {}
- Geographic Diversification: {}
- Risk Profile: {}

Analysis Type: {}
{}

Provide a concise, professional analysis with:
1. Key findings
2. Specific recommendations
3. Risk considerations
4. Market context

Keep response under 200 words and focus on actionable insights."#,
        digest.metrics.total_value,
        asset_mix,
        regions,
        digest.risk_profile,
        analysis_type,
        framing(analysis_type),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;
    use crate::models::{RawHolding, RawPortfolio};
    use crate::services::snapshot_service::build_snapshot;

    fn snapshot_with(n: usize) -> PortfolioSnapshot {
        // Values 1..=n scaled so allocations sum to 100.
        let total: f64 = (1..=n).map(|i| i as f64).sum();
        let holdings = (1..=n)
            .map(|i| RawHolding {
                symbol: format!("SYM{:03}", i),
                name: format!("Holding number {}", i),
                category: if i % 2 == 0 { "stock" } else { "bond" }.to_string(),
                region: if i % 3 == 0 { "Emerging" } else { "US" }.to_string(),
                allocation_pct: i as f64 / total * 100.0,
                value: i as f64 * 100.0,
                price: 10.0,
                change_pct: (i as f64 % 7.0) - 3.0,
            })
            .collect();

        build_snapshot(
            RawPortfolio { holdings, risk_profile: Some("aggressive".into()), return_history: None },
            &AnalyticsConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_small_portfolio_lists_every_holding_by_value() {
        let snapshot = snapshot_with(8);
        let request = build_narrative_request(&snapshot, AnalysisType::General, &DigestConfig::default()).unwrap();

        assert_eq!(request.digest.holdings.len(), 8);
        assert_eq!(request.digest.omitted_holdings, 0);
        assert_eq!(request.digest.holdings[0].symbol, "SYM008");
        assert_eq!(request.digest.holdings[7].symbol, "SYM001");
        assert!(request.prompt.contains("PORTFOLIO OVERVIEW"));
        assert!(request.prompt.contains("SYM008"));
        assert!(request.prompt.contains("Risk Profile: aggressive"));
    }

    #[test]
    fn test_large_portfolio_lists_only_top_holdings() {
        let snapshot = snapshot_with(40);
        let request = build_narrative_request(&snapshot, AnalysisType::Risk, &DigestConfig::default()).unwrap();

        assert_eq!(request.digest.holdings.len(), 5);
        assert_eq!(request.digest.omitted_holdings, 35);
        assert_eq!(request.digest.holdings[0].symbol, "SYM040");
        assert!(!request.prompt.contains("SYM001 "));
        assert!(request.prompt.contains("35 smaller holdings not listed"));
        assert!(request.prompt.chars().count() <= DigestConfig::default().max_chars);
    }

    #[test]
    fn test_prompt_respects_character_ceiling() {
        let snapshot = snapshot_with(15);
        let config = DigestConfig { max_chars: 900, ..DigestConfig::default() };

        let request = build_narrative_request(&snapshot, AnalysisType::General, &config).unwrap();
        assert!(request.prompt.chars().count() <= 900);
        assert!(request.digest.omitted_holdings > 0);
        assert_eq!(request.digest.holdings.len() + request.digest.omitted_holdings, 15);
    }

    #[test]
    fn test_ceiling_sheds_smallest_holdings_first() {
        // Values rise with input order, so the largest holding comes last.
        let snapshot = snapshot_with(15);
        let config = DigestConfig { max_chars: 900, ..DigestConfig::default() };

        let request = build_narrative_request(&snapshot, AnalysisType::General, &config).unwrap();
        let listed: Vec<_> = request.digest.holdings.iter().map(|h| h.symbol.as_str()).collect();

        assert!(request.digest.omitted_holdings > 0);
        assert_eq!(listed[0], "SYM015");
        assert!(request.prompt.contains("SYM015"));
        assert!(!listed.contains(&"SYM001"));

        let smallest_listed = request
            .digest
            .holdings
            .iter()
            .map(|h| h.value)
            .fold(f64::INFINITY, f64::min);
        let listed_count = request.digest.holdings.len();
        // Omitted holdings are exactly SYM001..SYM{omitted}, each below every listed value.
        assert!(smallest_listed > request.digest.omitted_holdings as f64 * 100.0);
        assert_eq!(listed_count + request.digest.omitted_holdings, 15);
    }

    #[test]
    fn test_unfittable_ceiling_is_invalid_request() {
        let snapshot = snapshot_with(3);
        let config = DigestConfig { max_chars: 50, ..DigestConfig::default() };

        let result = build_narrative_request(&snapshot, AnalysisType::General, &config);
        assert!(matches!(result, Err(AnalysisError::InvalidRequest(_))));
    }

    #[test]
    fn test_instruction_varies_by_analysis_type() {
        let snapshot = snapshot_with(4);
        let config = DigestConfig::default();

        let general = build_narrative_request(&snapshot, AnalysisType::General, &config).unwrap();
        let risk = build_narrative_request(&snapshot, AnalysisType::Risk, &config).unwrap();
        let rebalance = build_narrative_request(&snapshot, AnalysisType::Rebalance, &config).unwrap();

        assert_ne!(general.system_instruction, risk.system_instruction);
        assert_ne!(risk.system_instruction, rebalance.system_instruction);
        assert!(risk.system_instruction.contains("Analysis Type: risk"));
        assert!(general.system_instruction.contains("under 200 words"));
        assert_eq!(general.prompt, risk.prompt);
    }

    #[test]
    fn test_parse_analysis_type_rejects_unknown() {
        assert_eq!(parse_analysis_type("rebalance").unwrap(), AnalysisType::Rebalance);
        assert!(matches!(
            parse_analysis_type("astrology"),
            Err(AnalysisError::InvalidRequest(_))
        ));
    }
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::models::VolatilityMethod;
use crate::services::llm_service::LlmConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// What to do when a holding's declared allocation disagrees with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationPolicy {
    #[default]
    Reject,
    /// Replace declared allocations with value-implied ones
    Reconcile,
}

impl FromStr for AllocationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(AllocationPolicy::Reject),
            "reconcile" => Ok(AllocationPolicy::Reconcile),
            other => Err(format!("expected 'reject' or 'reconcile', got '{}'", other)),
        }
    }
}

/// Snapshot validation and metric settings.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Allowed drift, in percentage points, for allocation checks
    pub allocation_tolerance_pct: f64,
    pub allocation_policy: AllocationPolicy,
    pub volatility_method: VolatilityMethod,
    /// Same period and unit as holding returns
    pub risk_free_rate_pct: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            allocation_tolerance_pct: 0.5,
            allocation_policy: AllocationPolicy::Reject,
            volatility_method: VolatilityMethod::CrossSectional,
            risk_free_rate_pct: 0.0,
        }
    }
}

/// Bounds on the digest sent to the text generator.
#[derive(Debug, Clone)]
pub struct DigestConfig {
    /// Above this many holdings only the largest ones are listed
    pub holdings_threshold: usize,
    pub top_holdings: usize,
    /// Ceiling on the rendered prompt, roughly four characters per token
    pub max_chars: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            holdings_threshold: 20,
            top_holdings: 5,
            max_chars: 4000,
        }
    }
}

/// Caller-side retry for the two external calls. One attempt means no retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub fetch_timeout: Duration,
    pub generation_timeout: Duration,
    pub max_output_tokens: u32,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            generation_timeout: Duration::from_secs(30),
            max_output_tokens: 500,
            retry: RetryPolicy::default(),
        }
    }
}

/// Where holdings come from.
#[derive(Debug, Clone, PartialEq)]
pub enum HoldingsSourceConfig {
    File(PathBuf),
    Http(Url),
}

impl FromStr for HoldingsSourceConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with("http://") || s.starts_with("https://") {
            Url::parse(s)
                .map(HoldingsSourceConfig::Http)
                .map_err(|e| e.to_string())
        } else if s.is_empty() {
            Err("empty holdings source".to_string())
        } else {
            Ok(HoldingsSourceConfig::File(PathBuf::from(s)))
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub holdings_source: HoldingsSourceConfig,
    pub llm: LlmConfig,
    pub analytics: AnalyticsConfig,
    pub digest: DigestConfig,
    pub orchestrator: OrchestratorConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup so tests need not touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let llm_defaults = LlmConfig::default();
        let analytics_defaults = AnalyticsConfig::default();
        let digest_defaults = DigestConfig::default();
        let orchestrator_defaults = OrchestratorConfig::default();

        let api_key = lookup("LLM_API_KEY")
            .or_else(|| lookup("GROQ_API_KEY"))
            .filter(|k| !k.trim().is_empty());

        let llm = LlmConfig {
            enabled: parse_or(&lookup, "LLM_ENABLED", api_key.is_some())?,
            api_key,
            base_url: lookup("LLM_BASE_URL").unwrap_or(llm_defaults.base_url),
            model: lookup("LLM_MODEL").unwrap_or(llm_defaults.model),
            temperature: parse_or(&lookup, "LLM_TEMPERATURE", llm_defaults.temperature)?,
        };

        let analytics = AnalyticsConfig {
            allocation_tolerance_pct: parse_or(
                &lookup,
                "ALLOCATION_TOLERANCE_PCT",
                analytics_defaults.allocation_tolerance_pct,
            )?,
            allocation_policy: parse_or(&lookup, "ALLOCATION_POLICY", analytics_defaults.allocation_policy)?,
            volatility_method: parse_or(&lookup, "VOLATILITY_METHOD", analytics_defaults.volatility_method)?,
            risk_free_rate_pct: parse_or(&lookup, "RISK_FREE_RATE_PCT", analytics_defaults.risk_free_rate_pct)?,
        };

        let digest = DigestConfig {
            holdings_threshold: parse_or(&lookup, "DIGEST_HOLDINGS_THRESHOLD", digest_defaults.holdings_threshold)?,
            top_holdings: parse_or(&lookup, "DIGEST_TOP_HOLDINGS", digest_defaults.top_holdings)?,
            max_chars: parse_or(&lookup, "DIGEST_MAX_CHARS", digest_defaults.max_chars)?,
        };

        let orchestrator = OrchestratorConfig {
            fetch_timeout: Duration::from_secs(parse_or(
                &lookup,
                "ANALYSIS_FETCH_TIMEOUT_SECS",
                orchestrator_defaults.fetch_timeout.as_secs(),
            )?),
            generation_timeout: Duration::from_secs(parse_or(
                &lookup,
                "ANALYSIS_GENERATION_TIMEOUT_SECS",
                orchestrator_defaults.generation_timeout.as_secs(),
            )?),
            max_output_tokens: parse_or(&lookup, "LLM_MAX_OUTPUT_TOKENS", orchestrator_defaults.max_output_tokens)?,
            retry: RetryPolicy {
                max_attempts: parse_or(&lookup, "ANALYSIS_MAX_ATTEMPTS", orchestrator_defaults.retry.max_attempts)?
                    .max(1),
                backoff: Duration::from_millis(parse_or(
                    &lookup,
                    "ANALYSIS_RETRY_BACKOFF_MS",
                    orchestrator_defaults.retry.backoff.as_millis() as u64,
                )?),
            },
        };

        Ok(Self {
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            holdings_source: parse_or(
                &lookup,
                "HOLDINGS_SOURCE",
                HoldingsSourceConfig::File(PathBuf::from("data/portfolio.json")),
            )?,
            llm,
            analytics,
            digest,
            orchestrator,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid { key, message: e.to_string() }),
        _ => Ok(default),
    }
}

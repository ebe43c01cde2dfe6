use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{AnalyticsConfig, DigestConfig, OrchestratorConfig, RetryPolicy};
use crate::errors::{AnalysisError, GenerationError};
use crate::external::holdings_source::{DataSourceError, HoldingsSource};
use crate::models::{AnalysisReport, AnalysisType, PortfolioSnapshot, RawPortfolio};
use crate::services::llm_service::LlmService;
use crate::services::{narrative_service, snapshot_service};

/// Lifecycle of a single analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStage {
    Idle,
    Fetching,
    Computing,
    Summarizing,
    Generating,
    Done,
    Failed,
}

impl AnalysisStage {
    /// Stages only move forward one step at a time; any working stage may fail.
    pub fn can_advance_to(self, next: AnalysisStage) -> bool {
        use AnalysisStage::*;
        matches!(
            (self, next),
            (Idle, Fetching)
                | (Fetching, Computing)
                | (Computing, Summarizing)
                | (Summarizing, Generating)
                | (Generating, Done)
                | (Fetching | Computing | Summarizing | Generating, Failed)
        )
    }
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnalysisStage::Idle => "idle",
            AnalysisStage::Fetching => "fetching",
            AnalysisStage::Computing => "computing",
            AnalysisStage::Summarizing => "summarizing",
            AnalysisStage::Generating => "generating",
            AnalysisStage::Done => "done",
            AnalysisStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-request state tracker. Never shared between requests.
struct AnalysisRun {
    id: Uuid,
    stage: AnalysisStage,
    started: Instant,
}

impl AnalysisRun {
    fn start() -> Self {
        Self { id: Uuid::new_v4(), stage: AnalysisStage::Idle, started: Instant::now() }
    }

    fn advance(&mut self, next: AnalysisStage) {
        debug_assert!(self.stage.can_advance_to(next), "{} -> {}", self.stage, next);
        info!("Analysis {}: {} -> {}", self.id, self.stage, next);
        self.stage = next;
    }

    fn fail(&mut self, err: AnalysisError) -> AnalysisError {
        error!(
            "Analysis {} failed while {} after {:?}: {}",
            self.id,
            self.stage,
            self.started.elapsed(),
            err
        );
        self.stage = AnalysisStage::Failed;
        err
    }
}

/// Sequences fetch, compute, summarize and generate for one request.
///
/// Holds only configuration and the generation client; every call builds its own
/// snapshot, so concurrent requests share nothing mutable. Dropping a returned
/// future cancels whichever external call is in flight.
pub struct AnalysisService {
    llm: Arc<LlmService>,
    analytics: AnalyticsConfig,
    digest: DigestConfig,
    config: OrchestratorConfig,
}

impl AnalysisService {
    pub fn new(
        llm: Arc<LlmService>,
        analytics: AnalyticsConfig,
        digest: DigestConfig,
        config: OrchestratorConfig,
    ) -> Self {
        Self { llm, analytics, digest, config }
    }

    /// Run a full analysis. No partial result is returned on failure.
    pub async fn analyze(
        &self,
        source: &dyn HoldingsSource,
        analysis_type: AnalysisType,
    ) -> Result<AnalysisReport, AnalysisError> {
        let mut run = AnalysisRun::start();
        info!("Analysis {} ({}) from {}", run.id, analysis_type, source.describe());

        run.advance(AnalysisStage::Fetching);
        let raw = match self.fetch(source).await {
            Ok(raw) => raw,
            Err(e) => return Err(run.fail(e.into())),
        };

        run.advance(AnalysisStage::Computing);
        let snapshot = match snapshot_service::build_snapshot(raw, &self.analytics) {
            Ok(s) => s,
            Err(e) => return Err(run.fail(e.into())),
        };

        run.advance(AnalysisStage::Summarizing);
        let request = match narrative_service::build_narrative_request(&snapshot, analysis_type, &self.digest) {
            Ok(r) => r,
            Err(e) => return Err(run.fail(e)),
        };

        run.advance(AnalysisStage::Generating);
        let narrative = match self.generate(&request.system_instruction, &request.prompt).await {
            Ok(text) => text,
            Err(e) => return Err(run.fail(e.into())),
        };

        run.advance(AnalysisStage::Done);
        info!("Analysis {} completed in {:?}", run.id, run.started.elapsed());

        Ok(AnalysisReport {
            snapshot_id: snapshot.id(),
            analysis_type,
            analysis: narrative,
            metrics: snapshot.metrics().clone(),
            category_allocation: snapshot.category_allocation().clone(),
            region_allocation: snapshot.region_allocation().clone(),
            as_of: snapshot.as_of(),
        })
    }

    /// Fetch and compute only, without narrative generation.
    pub async fn snapshot(&self, source: &dyn HoldingsSource) -> Result<PortfolioSnapshot, AnalysisError> {
        let raw = self.fetch(source).await?;
        Ok(snapshot_service::build_snapshot(raw, &self.analytics)?)
    }

    async fn fetch(&self, source: &dyn HoldingsSource) -> Result<RawPortfolio, DataSourceError> {
        let timeout = self.config.fetch_timeout;
        with_retry(&self.config.retry, "fetch holdings", DataSourceError::is_retryable, || async move {
            tokio::time::timeout(timeout, source.fetch_holdings())
                .await
                .unwrap_or(Err(DataSourceError::Timeout))
        })
        .await
    }

    async fn generate(&self, system_instruction: &str, prompt: &str) -> Result<String, GenerationError> {
        let timeout = self.config.generation_timeout;
        let max_output_tokens = self.config.max_output_tokens;
        let llm = &self.llm;
        with_retry(&self.config.retry, "generate narrative", GenerationError::is_retryable, || async move {
            tokio::time::timeout(timeout, llm.generate(system_instruction, prompt, max_output_tokens))
                .await
                .unwrap_or(Err(GenerationError::Timeout))
        })
        .await
    }
}

/// Run `op` up to `policy.max_attempts` times with doubling backoff.
/// Errors that `retryable` rejects are returned on the first failure.
async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    retryable: fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.backoff;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts || !retryable(&e) => return Err(e),
            Err(e) => {
                warn!("{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                      what, attempt, max_attempts, e, delay);
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
        }
    }
}

//! Analysis Pipeline Module
//!
//! [`QualityEngine`] runs the four analysis stages concurrently and folds
//! their outcomes into a [`QualityReport`].
//!
//! ## Stages
//!
//! 1. **Similarity**: embed the candidates and pair the near-duplicates
//! 2. **Redundancy**: fingerprint assertions against the existing suite, check imports
//! 3. **Coverage**: Baseline vs Candidate delta and prioritized gaps
//! 4. **Suggestions**: advisory LLM output
//!
//! A stage that fails, times out, or misses the analysis deadline is marked
//! degraded and contributes nothing; the report is still produced. The only
//! error returned by [`QualityEngine::analyze`] is an empty candidate list.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use suitecheck_rs::core::pipeline::{AnalysisInputs, QualityEngine};
//! use suitecheck_rs::providers::{LocalEmbeddingProvider, WorkspaceSymbolIndex};
//!
//! let symbols = Arc::new(WorkspaceSymbolIndex::build(root)?);
//! let engine = QualityEngine::new(config, symbols)?
//!     .with_embedder(Arc::new(LocalEmbeddingProvider::default()));
//! let report = engine.analyze(AnalysisInputs::new(candidates)).await?;
//! println!("Score: {:.2} ({})", report.score, report.rating);
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::core::config::EngineConfig;
use crate::core::errors::{Result, SuiteError};
use crate::core::model::{CoverageRun, ParseFailure, RedundancyFinding, SimilarityPair, StageName, Suggestion, TestCase};
use crate::core::report::{QualityReport, ReportBuilder};
use crate::detectors::coverage::{run_coverage_pair, CoverageRunner, GapAnalysis, GapAnalyzer};
use crate::detectors::redundancy::RedundancyDetector;
use crate::detectors::similarity::SimilarityAnalyzer;
use crate::providers::{EmbeddingProvider, SuggestionProvider, SymbolIndex};

/// Where the coverage stage gets its two runs from.
pub enum CoverageSource {
    /// Runs measured elsewhere
    Precomputed {
        /// Existing suite without the candidate files
        baseline: CoverageRun,
        /// Existing suite plus the candidate files
        candidate: CoverageRun,
    },
    /// Execute the suite twice with a coverage runner
    Execute {
        /// Runner for the workspace's test framework
        runner: Arc<dyn CoverageRunner>,
        /// Directory the runner executes in
        workspace: PathBuf,
        /// Workspace-relative paths of the candidate test files
        candidate_files: Vec<String>,
    },
}

/// Everything one analysis looks at.
pub struct AnalysisInputs {
    /// Newly written tests under review; must not be empty
    pub candidates: Vec<TestCase>,
    /// Tests already in the suite, compared against for redundancy
    pub existing: Vec<TestCase>,
    /// Coverage input; `None` skips the coverage stage
    pub coverage: Option<CoverageSource>,
    /// Root for resolving source files named in coverage data
    pub source_root: Option<PathBuf>,
    /// Free-form project context passed to the suggestion provider
    pub context: String,
}

impl AnalysisInputs {
    pub fn new(candidates: Vec<TestCase>) -> Self {
        Self {
            candidates,
            existing: Vec::new(),
            coverage: None,
            source_root: None,
            context: String::new(),
        }
    }

    pub fn with_existing(mut self, existing: Vec<TestCase>) -> Self {
        self.existing = existing;
        self
    }

    pub fn with_coverage(mut self, coverage: CoverageSource) -> Self {
        self.coverage = Some(coverage);
        self
    }

    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// How a stage ended.
#[derive(Debug)]
enum StageOutcome<T> {
    Completed(T),
    Disabled,
    Degraded { warning: Option<String> },
}

impl<T> StageOutcome<T> {
    fn degraded() -> Self {
        Self::Degraded { warning: None }
    }

    fn degraded_with(warning: impl Into<String>) -> Self {
        Self::Degraded {
            warning: Some(warning.into()),
        }
    }
}

/// Orchestrates the analysis stages.
pub struct QualityEngine {
    config: Arc<EngineConfig>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    suggester: Option<Arc<dyn SuggestionProvider>>,
    symbols: Arc<dyn SymbolIndex>,
}

impl QualityEngine {
    /// Validate the configuration and create an engine without providers.
    pub fn new(config: EngineConfig, symbols: Arc<dyn SymbolIndex>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            embedder: None,
            suggester: None,
            symbols,
        })
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_suggester(mut self, suggester: Arc<dyn SuggestionProvider>) -> Self {
        self.suggester = Some(suggester);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every enabled stage and build the report.
    pub async fn analyze(&self, inputs: AnalysisInputs) -> Result<QualityReport> {
        if inputs.candidates.is_empty() {
            return Err(SuiteError::validation_field(
                "At least one candidate test is required",
                "candidates",
            ));
        }

        let AnalysisInputs {
            candidates,
            existing,
            coverage,
            source_root,
            context,
        } = inputs;
        let candidates: Arc<[TestCase]> = candidates.into();
        let existing: Arc<[TestCase]> = existing.into();
        let deadline = self.config.analysis_deadline().map(|budget| Instant::now() + budget);

        info!(
            "Analyzing {} candidate tests against {} existing tests",
            candidates.len(),
            existing.len()
        );

        let (similarity, redundancy, coverage, suggestions) = tokio::join!(
            bounded(StageName::Similarity, deadline, self.similarity_stage(candidates.clone())),
            bounded(
                StageName::Redundancy,
                deadline,
                self.redundancy_stage(candidates.clone(), existing)
            ),
            bounded(StageName::Coverage, deadline, self.coverage_stage(coverage, source_root)),
            bounded(StageName::Suggestions, deadline, self.suggestion_stage(candidates, context)),
        );

        let mut builder = ReportBuilder::new(self.config.similarity_threshold);
        builder = apply(builder, StageName::Similarity, similarity, |b, pairs| b.similarity_pairs(pairs));
        builder = apply(builder, StageName::Redundancy, redundancy, |b, (findings, failures)| {
            b.redundancy(findings, failures)
        });
        builder = apply(builder, StageName::Coverage, coverage, |b, analysis| {
            b.coverage(analysis.delta, analysis.module_coverage, analysis.gaps, analysis.total_gap_count)
        });
        builder = apply(builder, StageName::Suggestions, suggestions, |b, items| b.suggestions(items));

        let report = builder.build();
        info!(
            "Analysis complete: score {:.2} ({}), {} degraded stages",
            report.score,
            report.rating,
            report.degraded_stages.len()
        );
        Ok(report)
    }

    async fn similarity_stage(&self, candidates: Arc<[TestCase]>) -> StageOutcome<Vec<SimilarityPair>> {
        if !self.config.use_embeddings {
            return StageOutcome::Disabled;
        }
        let Some(embedder) = &self.embedder else {
            return StageOutcome::degraded_with("No embedding provider configured; similarity analysis skipped");
        };

        info!("Starting similarity analysis...");
        let analyzer = SimilarityAnalyzer::new(self.config.similarity_threshold);
        let budget = self.config.provider.call_budget();
        let pairs = match tokio::time::timeout(budget, analyzer.analyze(&candidates, embedder.as_ref())).await {
            Ok(result) => result,
            Err(_) => Err(SuiteError::timeout(format!("embedding via {}", embedder.name()), budget)),
        };
        match pairs {
            Ok(pairs) => {
                info!("Similarity analysis completed");
                StageOutcome::Completed(pairs)
            }
            Err(e) => {
                warn!("Similarity analysis degraded: {}", e);
                StageOutcome::degraded()
            }
        }
    }

    async fn redundancy_stage(
        &self,
        candidates: Arc<[TestCase]>,
        existing: Arc<[TestCase]>,
    ) -> StageOutcome<(Vec<RedundancyFinding>, Vec<ParseFailure>)> {
        if !self.config.check_redundant_tests && !self.config.check_outdated_imports {
            return StageOutcome::Disabled;
        }

        info!("Starting redundancy analysis...");
        let detector = RedundancyDetector::new(&self.config, self.symbols.clone());
        let task = tokio::task::spawn_blocking(move || detector.detect(&candidates, &existing));
        match task.await {
            Ok(outcome) => {
                info!("Redundancy analysis completed");
                StageOutcome::Completed((outcome.findings, outcome.parse_failures))
            }
            Err(e) => {
                warn!("Redundancy analysis task failed: {}", e);
                StageOutcome::degraded()
            }
        }
    }

    async fn coverage_stage(
        &self,
        source: Option<CoverageSource>,
        source_root: Option<PathBuf>,
    ) -> StageOutcome<GapAnalysis> {
        let Some(source) = source else {
            return StageOutcome::Disabled;
        };

        info!("Starting coverage analysis...");
        let (baseline, candidate, source_root) = match source {
            CoverageSource::Precomputed { baseline, candidate } => (baseline, candidate, source_root),
            CoverageSource::Execute {
                runner,
                workspace,
                candidate_files,
            } => {
                let runs = run_coverage_pair(
                    runner,
                    &workspace,
                    &candidate_files,
                    self.config.coverage_timeout(),
                    self.config.isolated_coverage_runs,
                )
                .await;
                match runs {
                    (Ok(baseline), Ok(candidate)) => (baseline, candidate, source_root.or(Some(workspace))),
                    (Err(e), _) | (_, Err(e)) => return coverage_failure(e),
                }
            }
        };
        self.gap_analysis(baseline, candidate, source_root).await
    }

    async fn gap_analysis(
        &self,
        baseline: CoverageRun,
        candidate: CoverageRun,
        source_root: Option<PathBuf>,
    ) -> StageOutcome<GapAnalysis> {
        let analyzer = GapAnalyzer::new(&self.config, source_root);
        match tokio::task::spawn_blocking(move || analyzer.analyze(&baseline, &candidate)).await {
            Ok(analysis) => {
                info!("Coverage analysis completed");
                StageOutcome::Completed(analysis)
            }
            Err(e) => {
                warn!("Gap analysis task failed: {}", e);
                StageOutcome::degraded()
            }
        }
    }

    async fn suggestion_stage(&self, candidates: Arc<[TestCase]>, context: String) -> StageOutcome<Vec<Suggestion>> {
        if !self.config.enable_ai_suggestions {
            return StageOutcome::Disabled;
        }
        let Some(suggester) = &self.suggester else {
            return StageOutcome::degraded_with("No suggestion provider configured; AI suggestions skipped");
        };

        info!("Requesting suggestions from {}...", suggester.name());
        let tests_code = candidates
            .iter()
            .map(|test| format!("# {}\n{}", test.id, test.code))
            .collect::<Vec<_>>()
            .join("\n\n");
        let budget = self.config.provider.call_budget();
        let suggestions = match tokio::time::timeout(budget, suggester.suggest(&tests_code, &context)).await {
            Ok(result) => result,
            Err(_) => Err(SuiteError::timeout(format!("suggestions via {}", suggester.name()), budget)),
        };
        match suggestions {
            Ok(suggestions) => {
                info!("Received {} suggestions", suggestions.len());
                StageOutcome::Completed(suggestions)
            }
            Err(e) => {
                warn!("Suggestion stage degraded: {}", e);
                StageOutcome::degraded()
            }
        }
    }
}

fn coverage_failure(error: SuiteError) -> StageOutcome<GapAnalysis> {
    warn!("Coverage analysis degraded: {}", error);
    match error {
        SuiteError::ToolMissing { .. } => StageOutcome::degraded_with(error.to_string()),
        _ => StageOutcome::degraded(),
    }
}

/// Drop the stage future when the deadline passes.
async fn bounded<T, F>(stage: StageName, deadline: Option<Instant>, stage_future: F) -> StageOutcome<T>
where
    F: Future<Output = StageOutcome<T>>,
{
    let Some(deadline) = deadline else {
        return stage_future.await;
    };
    match tokio::time::timeout_at(deadline, stage_future).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("{} stage missed the analysis deadline", stage);
            StageOutcome::degraded()
        }
    }
}

fn apply<T>(
    builder: ReportBuilder,
    stage: StageName,
    outcome: StageOutcome<T>,
    complete: impl FnOnce(ReportBuilder, T) -> ReportBuilder,
) -> ReportBuilder {
    match outcome {
        StageOutcome::Completed(value) => complete(builder, value),
        StageOutcome::Disabled => builder,
        StageOutcome::Degraded { warning: None } => builder.degraded(stage),
        StageOutcome::Degraded { warning: Some(warning) } => builder.degraded(stage).warning(warning),
    }
}

#[cfg(test)]
mod tests;

use super::*;
use std::time::Duration;

use approx::assert_relative_eq;
use async_trait::async_trait;

use crate::core::model::{CoverageScope, FindingKind, Language, Severity};
use crate::core::report::Rating;
use crate::detectors::coverage::CoverageRequest;
use crate::providers::StaticSymbolIndex;

struct FixedEmbedder(Vec<Vec<f32>>);

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(self.0.iter().take(texts.len()).cloned().collect())
    }
}

struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(SuiteError::provider("failing", "service unavailable"))
    }
}

struct SlowSuggester;

#[async_trait]
impl SuggestionProvider for SlowSuggester {
    fn name(&self) -> &str {
        "slow"
    }

    async fn suggest(&self, _tests_code: &str, _context: &str) -> Result<Vec<Suggestion>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

struct HangingEmbedder;

#[async_trait]
impl EmbeddingProvider for HangingEmbedder {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        std::future::pending().await
    }
}

struct CannedSuggester;

#[async_trait]
impl SuggestionProvider for CannedSuggester {
    fn name(&self) -> &str {
        "canned"
    }

    async fn suggest(&self, tests_code: &str, _context: &str) -> Result<Vec<Suggestion>> {
        assert!(tests_code.contains("test_login_ok"));
        Ok(vec![Suggestion {
            category: "fixture".to_string(),
            title: "Share the user fixture".to_string(),
            rationale: "Both tests build the same user".to_string(),
            affected_tests: Vec::new(),
            code_example: None,
        }])
    }
}

struct MissingToolRunner;

#[async_trait]
impl CoverageRunner for MissingToolRunner {
    fn name(&self) -> &str {
        "missing"
    }

    async fn run(&self, _request: &CoverageRequest) -> Result<CoverageRun> {
        Err(SuiteError::tool_missing("pytest", "pip install pytest-cov"))
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        enable_ai_suggestions: false,
        ..EngineConfig::default()
    }
}

fn engine(config: EngineConfig) -> QualityEngine {
    QualityEngine::new(config, Arc::new(StaticSymbolIndex::new(["app.auth"]))).unwrap()
}

fn python_test(name: &str, body: &str) -> TestCase {
    TestCase::new("tests/test_new.py", name, format!("def {}():\n{}", name, body), Language::Python)
}

fn login_tests() -> Vec<TestCase> {
    vec![
        python_test("test_login_ok", "    assert login('a', 'pw') is True\n"),
        python_test("test_login_bad", "    assert login('a', 'nope') is False\n"),
    ]
}

fn outdated_test() -> TestCase {
    python_test("test_reset", "    assert old_module.reset(1) == 0\n").with_import("src.old_module", ["old_module"])
}

#[tokio::test]
async fn test_zero_candidates_is_rejected() {
    let err = engine(config()).analyze(AnalysisInputs::new(Vec::new())).await.unwrap_err();
    assert!(matches!(err, SuiteError::Validation { .. }));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let bad = EngineConfig::default().with_similarity_threshold(1.5);
    assert!(QualityEngine::new(bad, Arc::new(StaticSymbolIndex::default())).is_err());
}

#[tokio::test]
async fn test_similar_pair_costs_half_a_point() {
    let embedder = FixedEmbedder(vec![vec![1.0, 0.0, 0.0, 0.0, 0.0], vec![41.0, 28.0, 5.0, 3.0, 1.0]]);
    let report = engine(config())
        .with_embedder(Arc::new(embedder))
        .analyze(AnalysisInputs::new(login_tests()))
        .await
        .unwrap();

    assert_eq!(report.similarity_pairs.len(), 1);
    assert_eq!(report.similarity_pairs[0].score, 0.82);
    assert_relative_eq!(report.score, 9.5);
    assert_eq!(report.rating, Rating::Excellent);
    assert!(report.degraded_stages.is_empty());
    assert_eq!(report.coverage_delta, None);
}

#[tokio::test]
async fn test_failing_embedder_degrades_only_similarity() {
    let mut candidates = login_tests();
    candidates.push(outdated_test());

    let report = engine(config())
        .with_embedder(Arc::new(FailingEmbedder))
        .analyze(AnalysisInputs::new(candidates))
        .await
        .unwrap();

    assert!(report.similarity_pairs.is_empty());
    assert!(report.is_degraded(StageName::Similarity));
    assert_eq!(report.degraded_stages.len(), 1);
    let outdated: Vec<_> = report.findings_of(FindingKind::OutdatedImport).collect();
    assert_eq!(outdated.len(), 1);
    assert_eq!(outdated[0].severity, Severity::High);
    assert_relative_eq!(report.score, 9.0);
}

#[tokio::test]
async fn test_missing_providers_warn() {
    let report = engine(EngineConfig::default())
        .analyze(AnalysisInputs::new(login_tests()))
        .await
        .unwrap();
    assert!(report.is_degraded(StageName::Similarity));
    assert!(report.is_degraded(StageName::Suggestions));
    assert_eq!(report.warnings.len(), 2);
}

#[tokio::test]
async fn test_disabled_stages_are_not_degraded() {
    let cfg = EngineConfig {
        use_embeddings: false,
        enable_ai_suggestions: false,
        check_redundant_tests: false,
        check_outdated_imports: false,
        ..EngineConfig::default()
    };
    let report = engine(cfg).analyze(AnalysisInputs::new(vec![outdated_test()])).await.unwrap();
    assert!(report.degraded_stages.is_empty());
    assert!(report.redundancy_findings.is_empty());
    assert_eq!(report.score, 10.0);
}

#[tokio::test]
async fn test_suggestions_count_toward_score() {
    let cfg = EngineConfig {
        use_embeddings: false,
        ..EngineConfig::default()
    };
    let report = engine(cfg)
        .with_suggester(Arc::new(CannedSuggester))
        .analyze(AnalysisInputs::new(login_tests()).with_context("auth service"))
        .await
        .unwrap();
    assert_eq!(report.suggestions.len(), 1);
    assert_relative_eq!(report.score, 9.75);
}

#[tokio::test]
async fn test_precomputed_coverage_produces_delta() {
    let baseline = CoverageRun::new(CoverageScope::Baseline, "t").with_file("app/auth.py", [(1, 1), (2, 0)]);
    let candidate = CoverageRun::new(CoverageScope::Candidate, "t").with_file("app/auth.py", [(1, 1), (2, 1)]);

    let report = engine(config())
        .with_embedder(Arc::new(FixedEmbedder(vec![vec![1.0, 0.0], vec![0.0, 1.0]])))
        .analyze(AnalysisInputs::new(login_tests()).with_coverage(CoverageSource::Precomputed { baseline, candidate }))
        .await
        .unwrap();

    let delta = report.coverage_delta.unwrap();
    assert_relative_eq!(delta.before, 50.0);
    assert_relative_eq!(delta.after, 100.0);
    assert!(report.coverage_gaps.is_empty());
    assert_eq!(report.module_coverage.len(), 1);
}

#[tokio::test]
async fn test_missing_coverage_tool_adds_warning() {
    let report = engine(config())
        .with_embedder(Arc::new(FixedEmbedder(vec![vec![1.0, 0.0], vec![0.0, 1.0]])))
        .analyze(AnalysisInputs::new(login_tests()).with_coverage(CoverageSource::Execute {
            runner: Arc::new(MissingToolRunner),
            workspace: std::env::temp_dir(),
            candidate_files: vec!["tests/test_new.py".to_string()],
        }))
        .await
        .unwrap();

    assert!(report.is_degraded(StageName::Coverage));
    assert_eq!(report.coverage_delta, None);
    assert!(report.warnings.iter().any(|w| w.contains("pytest")));
}

#[tokio::test]
async fn test_deadline_degrades_unfinished_stage() {
    let cfg = EngineConfig::default().with_analysis_deadline(Some(1));
    let report = engine(cfg)
        .with_embedder(Arc::new(FixedEmbedder(vec![vec![1.0, 0.0], vec![0.0, 1.0]])))
        .with_suggester(Arc::new(SlowSuggester))
        .analyze(AnalysisInputs::new(login_tests()))
        .await
        .unwrap();

    assert!(report.is_degraded(StageName::Suggestions));
    assert!(!report.is_degraded(StageName::Similarity));
    assert!(!report.is_degraded(StageName::Redundancy));
}

#[tokio::test]
async fn test_parse_failure_does_not_hide_other_findings() {
    let broken = python_test("test_broken", "    assert (\n");
    let report = engine(config())
        .with_embedder(Arc::new(FixedEmbedder(vec![vec![1.0, 0.0], vec![0.0, 1.0]])))
        .analyze(AnalysisInputs::new(vec![broken, outdated_test()]))
        .await
        .unwrap();

    assert_eq!(report.parse_failures.len(), 1);
    assert_eq!(report.parse_failures[0].test_id, "tests/test_new.py::test_broken");
    assert_eq!(report.findings_of(FindingKind::OutdatedImport).count(), 1);
}

#[tokio::test]
async fn test_analysis_is_idempotent() {
    let engine = engine(config()).with_embedder(Arc::new(FixedEmbedder(vec![
        vec![1.0, 0.0, 0.0, 0.0, 0.0],
        vec![41.0, 28.0, 5.0, 3.0, 1.0],
        vec![1.0, 1.0, 0.0, 0.0, 0.0],
    ])));
    let inputs = || {
        let mut candidates = login_tests();
        candidates.push(outdated_test());
        AnalysisInputs::new(candidates)
    };

    let first = engine.analyze(inputs()).await.unwrap();
    let second = engine.analyze(inputs()).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_hanging_providers_are_cut_off_without_deadline() {
    let mut cfg = EngineConfig::default().with_analysis_deadline(None);
    cfg.provider.request_timeout_seconds = 1;
    cfg.provider.max_retries = 0;

    let engine = engine(cfg)
        .with_embedder(Arc::new(HangingEmbedder))
        .with_suggester(Arc::new(SlowSuggester));
    let analysis = engine.analyze(AnalysisInputs::new(login_tests()));
    let report = tokio::time::timeout(Duration::from_secs(10), analysis)
        .await
        .expect("analysis finished")
        .unwrap();

    assert!(report.is_degraded(StageName::Similarity));
    assert!(report.is_degraded(StageName::Suggestions));
    assert!(!report.is_degraded(StageName::Redundancy));
}

#[test]
fn test_provider_call_budget_covers_retries() {
    let mut cfg = EngineConfig::default();
    cfg.provider.request_timeout_seconds = 20;
    cfg.provider.max_retries = 2;
    assert_eq!(cfg.provider.call_budget(), Duration::from_secs(60));
}

//! End-to-end analysis through the public API: real collection, report-file
//! coverage and rendering, with in-process provider fakes.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use approx::assert_relative_eq;
use async_trait::async_trait;
use tempfile::TempDir;

use suitecheck_rs::core::model::{FindingKind, Severity};
use suitecheck_rs::detectors::coverage::ReportFileSource;
use suitecheck_rs::io::reports::{render_report, OutputFormat};
use suitecheck_rs::lang::collector::collect_tests;
use suitecheck_rs::providers::{EmbeddingProvider, LocalEmbeddingProvider, StaticSymbolIndex, WorkspaceSymbolIndex};
use suitecheck_rs::{
    AnalysisInputs, CoverageSource, EngineConfig, Language, QualityEngine, QualityReport, Rating, Result, StageName,
    SuiteError,
};

const CANDIDATE_FILE: &str = r#"
from app.auth import login

def test_login_accepts_valid_password():
    user = make_user("alice")
    assert login(user, "secret") is True

def test_login_accepts_valid_password_again():
    user = make_user("bob")
    assert login(user, "hunter2") is True
"#;

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

struct BrokenEmbedder;

#[async_trait]
impl EmbeddingProvider for BrokenEmbedder {
    fn name(&self) -> &str {
        "broken"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(SuiteError::provider("broken", "connection reset"))
    }
}

fn offline_config() -> EngineConfig {
    EngineConfig {
        enable_ai_suggestions: false,
        ..EngineConfig::default()
    }
}

fn engine(config: EngineConfig) -> QualityEngine {
    QualityEngine::new(config, Arc::new(StaticSymbolIndex::new(["app.auth"]))).unwrap()
}

fn candidates() -> Vec<suitecheck_rs::TestCase> {
    collect_tests("tests/test_login_new.py", CANDIDATE_FILE, Language::Python).unwrap()
}

/// Source with `reset_password` on line 119 and its body on 120-135, padded to 1000 lines.
fn auth_source() -> String {
    let mut source = String::new();
    for n in 1..=118 {
        writeln!(source, "value_{} = {}", n, n).unwrap();
    }
    source.push_str("def reset_password(user):\n");
    for n in 120..=135 {
        writeln!(source, "    step_{} = user", n).unwrap();
    }
    for n in 136..=1000 {
        writeln!(source, "value_{} = {}", n, n).unwrap();
    }
    source
}

fn lcov(file: &str, hit: impl Fn(u32) -> bool) -> String {
    let mut report = format!("TN:\nSF:{}\n", file);
    for line in 1..=1000 {
        writeln!(report, "DA:{},{}", line, u32::from(hit(line))).unwrap();
    }
    report.push_str("end_of_record\n");
    report
}

fn write_workspace(root: &Path) {
    fs::create_dir_all(root.join("app")).unwrap();
    fs::write(root.join("app/auth.py"), auth_source()).unwrap();
    fs::write(root.join("baseline.info"), lcov("app/auth.py", |line| line <= 452)).unwrap();
    fs::write(
        root.join("candidate.info"),
        lcov("app/auth.py", |line| !(120..=135).contains(&line) && line <= 805),
    )
    .unwrap();
}

#[tokio::test]
async fn similar_candidates_cost_half_a_point() {
    let tests = candidates();
    assert_eq!(tests.len(), 2);

    let embedder = FixedEmbedder(vec![vec![1.0, 0.0, 0.0, 0.0, 0.0], vec![41.0, 28.0, 5.0, 3.0, 1.0]]);
    let report = engine(offline_config())
        .with_embedder(Arc::new(embedder))
        .analyze(AnalysisInputs::new(tests))
        .await
        .unwrap();

    assert_eq!(report.similarity_pairs.len(), 1);
    let pair = &report.similarity_pairs[0];
    assert_relative_eq!(pair.score, 0.82);
    assert_eq!(pair.test_id_a, "tests/test_login_new.py::test_login_accepts_valid_password");
    assert_relative_eq!(report.score, 9.5);
    assert_eq!(report.rating, Rating::Excellent);
}

#[tokio::test]
async fn coverage_reports_produce_delta_and_function_gap() {
    let dir = TempDir::new().unwrap();
    write_workspace(dir.path());

    let cfg = EngineConfig {
        use_embeddings: false,
        ..offline_config()
    };
    let inputs = AnalysisInputs::new(candidates()).with_coverage(CoverageSource::Execute {
        runner: Arc::new(ReportFileSource::new("baseline.info", "candidate.info")),
        workspace: dir.path().to_path_buf(),
        candidate_files: vec!["tests/test_login_new.py".to_string()],
    });
    let report = engine(cfg).analyze(inputs).await.unwrap();

    let delta = report.coverage_delta.expect("coverage delta");
    assert_relative_eq!(delta.before, 45.2, epsilon = 1e-9);
    assert_relative_eq!(delta.after, 78.9, epsilon = 1e-9);

    let first = &report.coverage_gaps[0];
    assert_eq!(first.file, "app/auth.py");
    assert_eq!((first.line_start, first.line_end), (120, 135));
    assert_eq!(first.enclosing_symbol.as_deref(), Some("reset_password"));
    assert!(first.is_function_fully_uncovered);

    let tail = &report.coverage_gaps[1];
    assert_eq!((tail.line_start, tail.line_end), (806, 1000));
    assert!(!tail.is_function_fully_uncovered);
    assert_eq!(report.total_gap_count, 2);

    let markdown = render_report(&report, OutputFormat::Markdown).unwrap();
    assert!(markdown.contains("reset_password"));
    assert!(markdown.contains("## Coverage by Module"));
}

#[tokio::test]
async fn missing_report_file_degrades_coverage_only() {
    let dir = TempDir::new().unwrap();
    let inputs = AnalysisInputs::new(candidates()).with_coverage(CoverageSource::Execute {
        runner: Arc::new(ReportFileSource::new("nope.info", "also-nope.info")),
        workspace: dir.path().to_path_buf(),
        candidate_files: Vec::new(),
    });
    let report = engine(offline_config())
        .with_embedder(Arc::new(LocalEmbeddingProvider::default()))
        .analyze(inputs)
        .await
        .unwrap();

    assert!(report.is_degraded(StageName::Coverage));
    assert!(!report.is_degraded(StageName::Similarity));
    assert_eq!(report.coverage_delta, None);
}

#[tokio::test]
async fn broken_embedder_keeps_other_stages() {
    let mut tests = candidates();
    tests.extend(
        collect_tests(
            "tests/test_legacy.py",
            "from app.legacy_billing import charge\n\ndef test_charge():\n    assert charge(10) == 10\n",
            Language::Python,
        )
        .unwrap(),
    );

    let report = engine(offline_config())
        .with_embedder(Arc::new(BrokenEmbedder))
        .analyze(AnalysisInputs::new(tests))
        .await
        .unwrap();

    assert!(report.similarity_pairs.is_empty());
    assert_eq!(report.degraded_stages.iter().copied().collect::<Vec<_>>(), vec![StageName::Similarity]);

    let outdated: Vec<_> = report.findings_of(FindingKind::OutdatedImport).collect();
    assert_eq!(outdated.len(), 1);
    assert_eq!(outdated[0].severity, Severity::High);
    assert_eq!(outdated[0].missing_module.as_deref(), Some("app.legacy_billing"));
}

#[tokio::test]
async fn json_report_round_trips_and_repeats() {
    let engine = engine(offline_config()).with_embedder(Arc::new(LocalEmbeddingProvider::default()));

    let first = engine.analyze(AnalysisInputs::new(candidates())).await.unwrap();
    let second = engine.analyze(AnalysisInputs::new(candidates())).await.unwrap();
    assert_eq!(first, second);

    let json = render_report(&first, OutputFormat::Json).unwrap();
    let parsed: QualityReport = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.rating, first.rating);
    assert_eq!(parsed.similarity_pairs.len(), first.similarity_pairs.len());
    assert_eq!(parsed.degraded_stages, first.degraded_stages);
}

#[tokio::test]
async fn pyproject_dependencies_are_not_outdated_imports() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("app")).unwrap();
    fs::write(dir.path().join("app/stats.py"), "def mean(values):\n    return 0\n").unwrap();
    fs::write(
        dir.path().join("pyproject.toml"),
        "[project]\nname = \"stats\"\ndependencies = [\"requests>=2\", \"numpy\"]\n",
    )
    .unwrap();

    let tests = collect_tests(
        "tests/test_stats.py",
        "import numpy as np\nimport requests\nfrom app.stats import mean\nfrom app.gone import legacy\n\ndef test_mean():\n    assert mean(np.array([1, 2])) == 0\n    assert requests.codes.ok == 200\n",
        Language::Python,
    )
    .unwrap();

    let symbols = Arc::new(WorkspaceSymbolIndex::build(dir.path()).unwrap());
    let report = QualityEngine::new(EngineConfig { use_embeddings: false, ..offline_config() }, symbols)
        .unwrap()
        .analyze(AnalysisInputs::new(tests))
        .await
        .unwrap();

    let missing: Vec<_> = report
        .findings_of(FindingKind::OutdatedImport)
        .filter_map(|finding| finding.missing_module.as_deref())
        .collect();
    assert_eq!(missing, vec!["app.gone"]);
}

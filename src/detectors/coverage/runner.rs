//! Coverage tool adapters.
//!
//! A runner executes the workspace's test suite under instrumentation for one
//! scope and returns the parsed [`CoverageRun`]. Each scope writes its data to
//! its own files under `.suitecheck/` so two runs never share a data file.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::parsers::parse_report;
use crate::core::errors::{Result, SuiteError};
use crate::core::model::{CoverageRun, CoverageScope};

/// Directory inside the workspace that receives per-scope coverage data.
pub const OUTPUT_DIR: &str = ".suitecheck";

/// One instrumented run.
#[derive(Debug, Clone)]
pub struct CoverageRequest {
    pub workspace: PathBuf,
    pub scope: CoverageScope,
    /// Workspace-relative test files left out of this run
    pub exclude_files: Vec<String>,
    pub timeout: Duration,
}

impl CoverageRequest {
    /// Baseline leaves the candidate files out; Candidate runs everything.
    pub fn for_scope(workspace: &Path, scope: CoverageScope, candidate_files: &[String], timeout: Duration) -> Self {
        let exclude_files = match scope {
            CoverageScope::Baseline => candidate_files.to_vec(),
            CoverageScope::Candidate => Vec::new(),
        };
        Self {
            workspace: workspace.to_path_buf(),
            scope,
            exclude_files,
            timeout,
        }
    }

    fn output_dir(&self) -> PathBuf {
        self.workspace.join(OUTPUT_DIR)
    }
}

#[async_trait]
pub trait CoverageRunner: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, request: &CoverageRequest) -> Result<CoverageRun>;
}

/// `python -m pytest --cov` with a JSON report.
#[derive(Debug, Clone)]
pub struct PytestCoverageRunner {
    python: String,
    cov_source: String,
}

impl Default for PytestCoverageRunner {
    fn default() -> Self {
        Self {
            python: "python".to_string(),
            cov_source: ".".to_string(),
        }
    }
}

impl PytestCoverageRunner {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            ..Self::default()
        }
    }

    /// Restrict measurement to one source directory.
    pub fn with_cov_source(mut self, source: impl Into<String>) -> Self {
        self.cov_source = source.into();
        self
    }

    fn args(&self, request: &CoverageRequest, report: &Path) -> Vec<String> {
        let mut args = vec![
            "-m".to_string(),
            "pytest".to_string(),
            "-q".to_string(),
            "-p".to_string(),
            "no:cacheprovider".to_string(),
            format!("--cov={}", self.cov_source),
            "--cov-branch".to_string(),
            format!("--cov-report=json:{}", report.display()),
        ];
        args.extend(request.exclude_files.iter().map(|file| format!("--ignore={}", file)));
        args
    }
}

#[async_trait]
impl CoverageRunner for PytestCoverageRunner {
    fn name(&self) -> &str {
        "pytest-cov"
    }

    async fn run(&self, request: &CoverageRequest) -> Result<CoverageRun> {
        let output_dir = request.output_dir();
        prepare_output_dir(&output_dir)?;
        let report = output_dir.join(format!("coverage-{}.json", request.scope));
        remove_stale(&report)?;

        let data_file = output_dir.join(format!(".coverage.{}", request.scope));
        let envs = [("COVERAGE_FILE".to_string(), data_file.display().to_string())];
        run_tool(&self.python, &self.args(request, &report), &request.workspace, &envs, request.timeout).await?;

        parse_report(&report, request.scope, &request.workspace)
    }
}

/// `npx jest --coverage` with the JSON reporter.
#[derive(Debug, Clone)]
pub struct JestCoverageRunner {
    program: String,
    prefix_args: Vec<String>,
}

impl Default for JestCoverageRunner {
    fn default() -> Self {
        Self {
            program: "npx".to_string(),
            prefix_args: vec!["jest".to_string()],
        }
    }
}

impl JestCoverageRunner {
    /// Use a specific program, for example `node_modules/.bin/jest`.
    pub fn with_program(program: impl Into<String>, prefix_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            prefix_args,
        }
    }

    /// Prefer the locally installed binary when the workspace has one.
    pub fn detect(workspace: &Path) -> Option<Self> {
        if !package_uses_jest(workspace) {
            return None;
        }
        let local = workspace.join("node_modules").join(".bin").join("jest");
        Some(if local.is_file() {
            Self::with_program(local.display().to_string(), Vec::new())
        } else {
            Self::default()
        })
    }

    fn args(&self, request: &CoverageRequest, coverage_dir: &Path) -> Vec<String> {
        let mut args = self.prefix_args.clone();
        args.extend([
            "--coverage".to_string(),
            "--coverageReporters=json".to_string(),
            format!("--coverageDirectory={}", coverage_dir.display()),
            "--ci".to_string(),
            "--silent".to_string(),
        ]);
        for file in &request.exclude_files {
            args.push("--testPathIgnorePatterns".to_string());
            args.push(escape_pattern(file));
        }
        args
    }
}

#[async_trait]
impl CoverageRunner for JestCoverageRunner {
    fn name(&self) -> &str {
        "jest"
    }

    async fn run(&self, request: &CoverageRequest) -> Result<CoverageRun> {
        let output_dir = request.output_dir();
        prepare_output_dir(&output_dir)?;
        let coverage_dir = output_dir.join(format!("jest-{}", request.scope));
        let report = coverage_dir.join("coverage-final.json");
        remove_stale(&report)?;

        run_tool(&self.program, &self.args(request, &coverage_dir), &request.workspace, &[], request.timeout).await?;

        parse_report(&report, request.scope, &request.workspace)
    }
}

/// Pre-generated reports, one per scope.
#[derive(Debug, Clone)]
pub struct ReportFileSource {
    baseline: PathBuf,
    candidate: PathBuf,
}

impl ReportFileSource {
    pub fn new(baseline: impl Into<PathBuf>, candidate: impl Into<PathBuf>) -> Self {
        Self {
            baseline: baseline.into(),
            candidate: candidate.into(),
        }
    }
}

#[async_trait]
impl CoverageRunner for ReportFileSource {
    fn name(&self) -> &str {
        "report-files"
    }

    async fn run(&self, request: &CoverageRequest) -> Result<CoverageRun> {
        let path = match request.scope {
            CoverageScope::Baseline => &self.baseline,
            CoverageScope::Candidate => &self.candidate,
        };
        let path = if path.is_absolute() {
            path.clone()
        } else {
            request.workspace.join(path)
        };
        let workspace = request.workspace.clone();
        let scope = request.scope;
        tokio::task::spawn_blocking(move || parse_report(&path, scope, &workspace))
            .await
            .map_err(|e| SuiteError::internal(format!("Report parsing task failed: {}", e)))?
    }
}

/// Pick a runner from the workspace's manifests.
pub fn runner_for_workspace(workspace: &Path) -> Result<Arc<dyn CoverageRunner>> {
    if let Some(jest) = JestCoverageRunner::detect(workspace) {
        info!("Using jest for coverage");
        return Ok(Arc::new(jest));
    }

    let python_markers = ["pytest.ini", "pyproject.toml", "setup.cfg", "setup.py", "tox.ini", "requirements.txt"];
    if python_markers.iter().any(|marker| workspace.join(marker).is_file()) {
        info!("Using pytest-cov for coverage");
        return Ok(Arc::new(PytestCoverageRunner::default()));
    }

    Err(SuiteError::config(format!(
        "No supported coverage tool detected in {}",
        workspace.display()
    )))
}

fn package_uses_jest(workspace: &Path) -> bool {
    let Ok(content) = std::fs::read_to_string(workspace.join("package.json")) else {
        return false;
    };
    let Ok(manifest) = serde_json::from_str::<Value>(&content) else {
        return false;
    };
    let in_deps = ["dependencies", "devDependencies"].iter().any(|section| {
        manifest
            .get(section)
            .and_then(Value::as_object)
            .is_some_and(|deps| deps.contains_key("jest") || deps.contains_key("ts-jest"))
    });
    let in_script = manifest
        .pointer("/scripts/test")
        .and_then(Value::as_str)
        .is_some_and(|script| script.contains("jest"));
    in_deps || in_script || manifest.get("jest").is_some()
}

/// Escape a path for use as a jest path regex.
fn escape_pattern(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn prepare_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| SuiteError::io(format!("Failed to create {}", dir.display()), e))
}

fn remove_stale(report: &Path) -> Result<()> {
    match std::fs::remove_file(report) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SuiteError::io(format!("Failed to remove stale {}", report.display()), e)),
    }
}

/// Run a tool to completion within `timeout`.
///
/// A non-zero exit is logged but not fatal: test failures still leave a
/// report behind, and a missing report is caught by the parser.
async fn run_tool(
    program: &str,
    args: &[String],
    cwd: &Path,
    envs: &[(String, String)],
    timeout: Duration,
) -> Result<()> {
    debug!("Running {} {}", program, args.join(" "));
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in envs {
        command.env(key, value);
    }

    let child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SuiteError::tool_missing(program, format!("Install {} or put it on PATH", program))
        } else {
            SuiteError::io(format!("Failed to start {}", program), e)
        }
    })?;

    // dropping the future on timeout drops the child, which kills it
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| SuiteError::timeout(format!("{} coverage run", program), timeout))?
        .map_err(|e| SuiteError::io(format!("Failed to wait for {}", program), e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        warn!(
            "{} exited with {}: {}",
            program,
            output.status,
            tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
        );
    }
    Ok(())
}

/// Copy a workspace for an isolated run.
///
/// VCS metadata and previous coverage output are skipped; `node_modules`
/// is linked instead of copied where the platform allows it.
pub fn snapshot_workspace(source: &Path) -> Result<TempDir> {
    let target = tempfile::Builder::new()
        .prefix("suitecheck-ws-")
        .tempdir()
        .map_err(|e| SuiteError::io("Failed to create workspace copy", e))?;

    let walker = WalkDir::new(source).into_iter().filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy();
        entry.depth() == 0 || !matches!(name.as_ref(), ".git" | ".hg" | OUTPUT_DIR | "node_modules")
    });

    for entry in walker {
        let entry = entry.map_err(|e| SuiteError::coverage(format!("Failed to walk workspace: {}", e)))?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let destination = target.path().join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)
                .map_err(|e| SuiteError::io(format!("Failed to create {}", destination.display()), e))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &destination)
                .map_err(|e| SuiteError::io(format!("Failed to copy {}", entry.path().display()), e))?;
        }
    }

    let modules = source.join("node_modules");
    if modules.is_dir() {
        link_dir(&modules, &target.path().join("node_modules"))?;
    }
    Ok(target)
}

#[cfg(unix)]
fn link_dir(source: &Path, destination: &Path) -> Result<()> {
    std::os::unix::fs::symlink(source, destination)
        .map_err(|e| SuiteError::io(format!("Failed to link {}", source.display()), e))
}

#[cfg(not(unix))]
fn link_dir(source: &Path, destination: &Path) -> Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| SuiteError::coverage(format!("Failed to walk {}: {}", source.display(), e)))?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| SuiteError::io("Failed to copy node_modules", e))?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| SuiteError::io("Failed to copy node_modules", e))?;
        }
    }
    Ok(())
}

/// Run Baseline and Candidate against the same workspace snapshot.
///
/// With `isolated` each run gets its own copy and both run concurrently;
/// otherwise they run one after the other in `workspace`.
pub async fn run_coverage_pair(
    runner: Arc<dyn CoverageRunner>,
    workspace: &Path,
    candidate_files: &[String],
    timeout: Duration,
    isolated: bool,
) -> (Result<CoverageRun>, Result<CoverageRun>) {
    info!("Running coverage with {} (isolated: {})", runner.name(), isolated);

    if !isolated {
        let baseline = runner
            .run(&CoverageRequest::for_scope(workspace, CoverageScope::Baseline, candidate_files, timeout))
            .await;
        let candidate = runner
            .run(&CoverageRequest::for_scope(workspace, CoverageScope::Candidate, candidate_files, timeout))
            .await;
        return (baseline, candidate);
    }

    let snapshots = {
        let source = workspace.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<(TempDir, TempDir)> {
            Ok((snapshot_workspace(&source)?, snapshot_workspace(&source)?))
        })
        .await
    };
    let (baseline_dir, candidate_dir) = match snapshots {
        Ok(Ok(dirs)) => dirs,
        Ok(Err(err)) => return (Err(SuiteError::coverage(err.to_string())), Err(err)),
        Err(join) => {
            let message = format!("Workspace copy task failed: {}", join);
            return (Err(SuiteError::internal(message.clone())), Err(SuiteError::internal(message)));
        }
    };

    let baseline_request =
        CoverageRequest::for_scope(baseline_dir.path(), CoverageScope::Baseline, candidate_files, timeout);
    let candidate_request =
        CoverageRequest::for_scope(candidate_dir.path(), CoverageScope::Candidate, candidate_files, timeout);
    let (baseline, candidate) = tokio::join!(runner.run(&baseline_request), runner.run(&candidate_request));
    (baseline, candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn request(workspace: &Path, scope: CoverageScope) -> CoverageRequest {
        CoverageRequest::for_scope(workspace, scope, &["tests/test_new.py".to_string()], Duration::from_secs(5))
    }

    #[test]
    fn test_baseline_excludes_candidates() {
        let dir = Path::new("/ws");
        assert_eq!(request(dir, CoverageScope::Baseline).exclude_files, vec!["tests/test_new.py"]);
        assert!(request(dir, CoverageScope::Candidate).exclude_files.is_empty());
    }

    #[test]
    fn test_pytest_args_use_scope_report() {
        let runner = PytestCoverageRunner::default().with_cov_source("src");
        let req = request(Path::new("/ws"), CoverageScope::Baseline);
        let args = runner.args(&req, Path::new("/ws/.suitecheck/coverage-baseline.json"));
        assert!(args.contains(&"--cov=src".to_string()));
        assert!(args.contains(&"--cov-report=json:/ws/.suitecheck/coverage-baseline.json".to_string()));
        assert!(args.contains(&"--ignore=tests/test_new.py".to_string()));
    }

    #[test]
    fn test_jest_args_escape_ignored_paths() {
        let runner = JestCoverageRunner::default();
        let req = CoverageRequest::for_scope(
            Path::new("/ws"),
            CoverageScope::Baseline,
            &["test/auth.test.js".to_string()],
            Duration::from_secs(5),
        );
        let args = runner.args(&req, Path::new("/ws/.suitecheck/jest-baseline"));
        assert_eq!(args[0], "jest");
        assert!(args.contains(&"test/auth\\.test\\.js".to_string()));
        assert!(args.contains(&"--coverageDirectory=/ws/.suitecheck/jest-baseline".to_string()));
    }

    #[test]
    fn test_runner_detection() {
        let dir = TempDir::new().unwrap();
        assert!(runner_for_workspace(dir.path()).is_err());

        fs::write(dir.path().join("pyproject.toml"), "[project]\nname='x'\n").unwrap();
        assert_eq!(runner_for_workspace(dir.path()).unwrap().name(), "pytest-cov");

        fs::write(dir.path().join("package.json"), r#"{"scripts": {"test": "jest --ci"}}"#).unwrap();
        assert_eq!(runner_for_workspace(dir.path()).unwrap().name(), "jest");
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported() {
        let dir = TempDir::new().unwrap();
        let runner = PytestCoverageRunner::new("definitely-not-a-python-binary");
        let err = runner.run(&request(dir.path(), CoverageScope::Candidate)).await.unwrap_err();
        assert!(matches!(err, SuiteError::ToolMissing { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_the_run() {
        let dir = TempDir::new().unwrap();
        let err = run_tool("sleep", &["5".to_string()], dir.path(), &[], Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, SuiteError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_report_file_source_picks_scope() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("base.info"), "SF:a.js\nDA:1,0\nend_of_record\n").unwrap();
        fs::write(dir.path().join("cand.info"), "SF:a.js\nDA:1,3\nend_of_record\n").unwrap();
        let source = ReportFileSource::new("base.info", "cand.info");

        let (baseline, candidate) =
            run_coverage_pair(Arc::new(source), dir.path(), &[], Duration::from_secs(5), false).await;
        assert_eq!(baseline.unwrap().line_coverage_percent(), 0.0);
        assert_eq!(candidate.unwrap().line_coverage_percent(), 100.0);
    }

    #[test]
    fn test_snapshot_skips_vcs_and_output() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/app.py"), "x = 1\n").unwrap();

        let copy = snapshot_workspace(dir.path()).unwrap();
        assert!(copy.path().join("src/app.py").is_file());
        assert!(!copy.path().join(".git").exists());
    }
}

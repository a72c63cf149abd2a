//! Data model shared by every analysis stage.
//!
//! All entities are created once per engine invocation and never mutated
//! afterwards. Maps are `BTreeMap`/`BTreeSet` so iteration order, and hence
//! report output, is deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source language of a test or source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python (pytest / unittest)
    Python,
    /// JavaScript (jest / vitest / mocha)
    JavaScript,
    /// TypeScript (jest / vitest)
    TypeScript,
}

impl Language {
    /// Detect a language from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "py" | "pyi" => Some(Self::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "ts" | "tsx" | "mts" | "cts" => Some(Self::TypeScript),
            _ => None,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
        }
    }

    /// Whether the language uses ES module / CommonJS import semantics.
    pub fn is_ecmascript(self) -> bool {
        matches!(self, Self::JavaScript | Self::TypeScript)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized assertion: `(kind, left-operand shape, right-operand literal)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssertionTriple {
    /// Canonical assertion kind (`eq`, `truthy`, `contains`, ...)
    pub kind: String,
    /// Shape of the asserted value with variable names erased
    pub left_shape: String,
    /// Normalized literal (or shape) of the expected value; empty when absent
    pub right_literal: String,
}

impl fmt::Display for AssertionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.kind, self.left_shape, self.right_literal)
    }
}

/// Order-independent set of a test's assertions.
pub type Fingerprint = BTreeSet<AssertionTriple>;

/// A single test function or test block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Unique id, `<source_file>::<qualified name>`
    pub id: String,
    /// File the test was collected from, relative to the workspace
    pub source_file: String,
    /// Test name as written
    pub name: String,
    /// Dedented source of the test
    pub code: String,
    /// Source language
    pub language: Language,
    /// First line of the test in its file (1-based)
    pub line_start: usize,
    /// Last line of the test in its file (1-based)
    pub line_end: usize,
    /// Docstring, when the language has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    /// Precomputed embedding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_vector: Option<Vec<f32>>,
    /// Precomputed assertion fingerprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion_fingerprint: Option<Fingerprint>,
    /// Imported module path mapped to the names it binds
    #[serde(default)]
    pub imported_modules: BTreeMap<String, BTreeSet<String>>,
}

impl TestCase {
    /// Create a test case with no derived data attached.
    pub fn new(
        source_file: impl Into<String>,
        name: impl Into<String>,
        code: impl Into<String>,
        language: Language,
    ) -> Self {
        let source_file = source_file.into();
        let name = name.into();
        let code = code.into();
        let line_count = code.lines().count().max(1);
        Self {
            id: format!("{source_file}::{name}"),
            source_file,
            name,
            code,
            language,
            line_start: 1,
            line_end: line_count,
            docstring: None,
            embedding_vector: None,
            assertion_fingerprint: None,
            imported_modules: BTreeMap::new(),
        }
    }

    /// Override the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Record an import and the names it binds.
    pub fn with_import<I, S>(mut self, module: impl Into<String>, bindings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imported_modules
            .entry(module.into())
            .or_default()
            .extend(bindings.into_iter().map(Into::into));
        self
    }

    /// Attach a precomputed embedding.
    pub fn with_embedding(mut self, vector: Vec<f32>) -> Self {
        self.embedding_vector = Some(vector);
        self
    }

    /// Attach a precomputed fingerprint.
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.assertion_fingerprint = Some(fingerprint);
        self
    }

    /// Set the line span within the source file.
    pub fn with_lines(mut self, start: usize, end: usize) -> Self {
        self.line_start = start;
        self.line_end = end;
        self
    }

    /// Attach a docstring.
    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    /// Text handed to the embedding provider.
    pub fn embedding_text(&self) -> String {
        let mut text = format!("Test: {}\n", self.name);
        if let Some(doc) = &self.docstring {
            text.push_str(&format!("Description: {doc}\n"));
        }
        text.push_str(&format!("Code:\n{}", self.code));
        text
    }
}

/// Which side of the coverage comparison a run measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageScope {
    /// Existing suite without the candidate tests
    Baseline,
    /// Existing suite plus the candidate tests
    Candidate,
}

impl CoverageScope {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Candidate => "candidate",
        }
    }
}

impl fmt::Display for CoverageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw hit data from one instrumented test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRun {
    /// Baseline or candidate
    pub scope: CoverageScope,
    /// Workspace-relative path to line number to hit count
    pub per_file_line_hits: BTreeMap<String, BTreeMap<u32, u64>>,
    /// Workspace-relative path to branch id to hit count
    pub per_file_branch_hits: BTreeMap<String, BTreeMap<String, u64>>,
    /// When the run finished
    pub timestamp: DateTime<Utc>,
    /// Tool that produced the data
    pub tool_name: String,
}

impl CoverageRun {
    /// Create an empty run.
    pub fn new(scope: CoverageScope, tool_name: impl Into<String>) -> Self {
        Self {
            scope,
            per_file_line_hits: BTreeMap::new(),
            per_file_branch_hits: BTreeMap::new(),
            timestamp: Utc::now(),
            tool_name: tool_name.into(),
        }
    }

    /// Attach line hits for one file.
    pub fn with_file<I>(mut self, path: impl Into<String>, hits: I) -> Self
    where
        I: IntoIterator<Item = (u32, u64)>,
    {
        self.per_file_line_hits
            .entry(path.into())
            .or_default()
            .extend(hits);
        self
    }

    /// Number of executable lines across all files.
    pub fn executable_lines(&self) -> usize {
        self.per_file_line_hits.values().map(BTreeMap::len).sum()
    }

    /// Number of executable lines hit at least once.
    pub fn hit_lines(&self) -> usize {
        self.per_file_line_hits
            .values()
            .map(|lines| lines.values().filter(|&&hits| hits > 0).count())
            .sum()
    }

    /// Line coverage percentage over the whole run; 0.0 when nothing is executable.
    pub fn line_coverage_percent(&self) -> f64 {
        percent(self.hit_lines(), self.executable_lines())
    }

    /// Line coverage percentage for one file, if the run measured it.
    pub fn file_coverage_percent(&self, file: &str) -> Option<f64> {
        let lines = self.per_file_line_hits.get(file)?;
        let hit = lines.values().filter(|&&hits| hits > 0).count();
        Some(percent(hit, lines.len()))
    }

    /// Sorted line numbers with zero hits in a file.
    pub fn uncovered_lines(&self, file: &str) -> Vec<u32> {
        self.per_file_line_hits
            .get(file)
            .map(|lines| {
                lines
                    .iter()
                    .filter(|(_, &hits)| hits == 0)
                    .map(|(&line, _)| line)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Branch coverage percentage, if the tool reported branches.
    pub fn branch_coverage_percent(&self) -> Option<f64> {
        let total: usize = self.per_file_branch_hits.values().map(BTreeMap::len).sum();
        if total == 0 {
            return None;
        }
        let hit: usize = self
            .per_file_branch_hits
            .values()
            .map(|b| b.values().filter(|&&hits| hits > 0).count())
            .sum();
        Some(percent(hit, total))
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(hit: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (hit as f64 * 100.0) / total as f64
    }
}

/// Coverage percentages before and after adding the candidate tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageDelta {
    /// Baseline line coverage percentage
    pub before: f64,
    /// Candidate line coverage percentage
    pub after: f64,
}

impl CoverageDelta {
    /// Percentage points gained by the candidate tests.
    pub fn gain(&self) -> f64 {
        self.after - self.before
    }
}

/// Per-file coverage change between the two runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleCoverage {
    /// Workspace-relative file path
    pub file: String,
    /// Baseline percentage (0 when the file was not measured)
    pub before: f64,
    /// Candidate percentage (0 when the file was not measured)
    pub after: f64,
    /// `after - before`
    pub change: f64,
}

/// A contiguous range of zero-hit lines in the candidate run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageGap {
    /// Workspace-relative file path
    pub file: String,
    /// First uncovered line (1-based, inclusive)
    pub line_start: u32,
    /// Last uncovered line (1-based, inclusive)
    pub line_end: u32,
    /// Smallest function containing the range
    pub enclosing_symbol: Option<String>,
    /// Every executable body line of the enclosing function is in this gap
    pub is_function_fully_uncovered: bool,
    /// Short human-readable reason
    pub reason: String,
}

impl CoverageGap {
    /// Number of lines in the range.
    pub fn size(&self) -> u32 {
        self.line_end - self.line_start + 1
    }
}

/// Two candidate tests whose embeddings are close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityPair {
    /// Lexicographically smaller test id
    pub test_id_a: String,
    /// Lexicographically larger test id
    pub test_id_b: String,
    /// Cosine similarity in [0, 1]
    pub score: f64,
    /// Template-derived recommendation
    pub recommendation: String,
    /// Template code showing the recommended consolidation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_code: Option<String>,
}

/// What a redundancy finding reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FindingKind {
    /// Covered by an existing test
    Redundant,
    /// Imports a module that no longer exists
    OutdatedImport,
}

/// Finding severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Informational
    Low,
    /// Should be addressed
    Medium,
    /// Test is likely broken
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(label)
    }
}

/// A redundant test or an outdated import in a candidate test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedundancyFinding {
    /// Candidate test id
    pub test_id: String,
    /// Finding kind
    pub kind: FindingKind,
    /// Existing test the candidate duplicates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_test_id: Option<String>,
    /// Module that the symbol index does not know
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_module: Option<String>,
    /// Severity
    pub severity: Severity,
    /// Human-readable explanation
    pub reason: String,
}

/// Advisory optimization suggestion from the suggestion provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Category such as `parameterization` or `fixture`
    pub category: String,
    /// One-line title
    pub title: String,
    /// Why the change helps
    pub rationale: String,
    /// Test names the suggestion applies to
    #[serde(default)]
    pub affected_tests: Vec<String>,
    /// Example code, when provided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_example: Option<String>,
}

/// A test skipped because its source did not parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    /// Test id
    pub test_id: String,
    /// Language the parse was attempted in
    pub language: Language,
    /// Parser message
    pub message: String,
}

/// Analysis stages that can degrade independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    /// Embedding similarity
    Similarity,
    /// Redundancy and outdated imports
    Redundancy,
    /// Coverage delta and gaps
    Coverage,
    /// LLM suggestions
    Suggestions,
}

impl StageName {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Similarity => "similarity",
            Self::Redundancy => "redundancy",
            Self::Coverage => "coverage",
            Self::Suggestions => "suggestions",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path(&PathBuf::from("tests/test_a.py")), Some(Language::Python));
        assert_eq!(Language::from_path(&PathBuf::from("a.spec.tsx")), Some(Language::TypeScript));
        assert_eq!(Language::from_path(&PathBuf::from("a.test.mjs")), Some(Language::JavaScript));
        assert_eq!(Language::from_path(&PathBuf::from("README")), None);
    }

    #[test]
    fn test_coverage_run_percentages() {
        let run = CoverageRun::new(CoverageScope::Baseline, "pytest-cov")
            .with_file("a.py", [(1, 1), (2, 0), (3, 4), (4, 0)])
            .with_file("b.py", [(1, 0)]);
        assert_eq!(run.executable_lines(), 5);
        assert_eq!(run.hit_lines(), 2);
        assert_relative_eq!(run.line_coverage_percent(), 40.0);
        assert_relative_eq!(run.file_coverage_percent("a.py").unwrap(), 50.0);
        assert_eq!(run.uncovered_lines("a.py"), vec![2, 4]);
        assert!(run.file_coverage_percent("missing.py").is_none());
        assert!(run.branch_coverage_percent().is_none());
    }

    #[test]
    fn test_empty_run_is_zero_percent() {
        let run = CoverageRun::new(CoverageScope::Candidate, "jest");
        assert_relative_eq!(run.line_coverage_percent(), 0.0);
    }

    #[test]
    fn test_embedding_text_includes_docstring() {
        let test = TestCase::new("tests/test_a.py", "test_login", "def test_login():\n    pass\n", Language::Python)
            .with_docstring("Logs in");
        let text = test.embedding_text();
        assert!(text.contains("test_login"));
        assert!(text.contains("Logs in"));
        assert_eq!(test.id, "tests/test_a.py::test_login");
        assert_eq!(test.line_end, 2);
    }
}

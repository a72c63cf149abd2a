//! Coverage delta and gap analysis.
//!
//! Compares a Baseline run (existing suite) against a Candidate run (existing
//! suite plus the new tests), reports per-module change, and turns the
//! Candidate run's zero-hit lines into prioritized [`CoverageGap`]s annotated
//! with the function that encloses them.

pub mod parsers;
pub mod runner;

pub use parsers::{detect_format, parse_report, parse_report_bytes, ReportFormat};
pub use runner::{
    run_coverage_pair, runner_for_workspace, CoverageRequest, CoverageRunner, JestCoverageRunner,
    PytestCoverageRunner, ReportFileSource,
};

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::config::EngineConfig;
use crate::core::model::{CoverageDelta, CoverageGap, CoverageRun, Language, ModuleCoverage};
use crate::lang::common::{NodeKind, SyntaxNode};
use crate::lang::registry::parse_source;

/// Gaps longer than this are reported as large blocks.
const LARGE_GAP_LINES: u32 = 10;

/// Result of comparing two coverage runs.
#[derive(Debug, Clone, PartialEq)]
pub struct GapAnalysis {
    pub delta: CoverageDelta,
    pub module_coverage: Vec<ModuleCoverage>,
    /// Top gaps after prioritization
    pub gaps: Vec<CoverageGap>,
    /// Number of gaps before truncation
    pub total_gap_count: usize,
}

#[derive(Debug, Clone)]
pub struct GapAnalyzer {
    include_gaps: bool,
    top_gap_count: usize,
    source_root: Option<PathBuf>,
}

/// A named function in a parsed source file.
#[derive(Debug, Clone)]
struct FunctionSpan {
    name: String,
    start: u32,
    end: u32,
    body_start: u32,
}

impl FunctionSpan {
    fn contains(&self, start: u32, end: u32) -> bool {
        self.start <= start && end <= self.end
    }

    fn len(&self) -> u32 {
        self.end - self.start
    }
}

impl GapAnalyzer {
    pub fn new(config: &EngineConfig, source_root: Option<PathBuf>) -> Self {
        Self {
            include_gaps: config.include_gaps,
            top_gap_count: config.top_gap_count,
            source_root,
        }
    }

    pub fn analyze(&self, baseline: &CoverageRun, candidate: &CoverageRun) -> GapAnalysis {
        let delta = CoverageDelta {
            before: baseline.line_coverage_percent(),
            after: candidate.line_coverage_percent(),
        };
        info!(
            "Coverage {:.1}% -> {:.1}% ({:+.1} points)",
            delta.before,
            delta.after,
            delta.gain()
        );

        let module_coverage = module_coverage(baseline, candidate);

        if !self.include_gaps {
            return GapAnalysis {
                delta,
                module_coverage,
                gaps: Vec::new(),
                total_gap_count: 0,
            };
        }

        let mut gaps: Vec<CoverageGap> = candidate
            .per_file_line_hits
            .iter()
            .flat_map(|(file, hits)| self.gaps_for_file(file, hits))
            .collect();
        gaps.sort_by(compare_gaps);

        let total_gap_count = gaps.len();
        gaps.truncate(self.top_gap_count);
        debug!("Keeping {} of {} coverage gaps", gaps.len(), total_gap_count);

        GapAnalysis {
            delta,
            module_coverage,
            gaps,
            total_gap_count,
        }
    }

    fn gaps_for_file(&self, file: &str, hits: &BTreeMap<u32, u64>) -> Vec<CoverageGap> {
        let uncovered: Vec<u32> = hits.iter().filter(|(_, &count)| count == 0).map(|(&line, _)| line).collect();
        if uncovered.is_empty() {
            return Vec::new();
        }

        let functions = self.functions_in(file);
        let executable: BTreeSet<u32> = hits.keys().copied().collect();

        merge_uncovered_lines(&uncovered)
            .into_iter()
            .map(|(start, end)| {
                let function = functions
                    .iter()
                    .filter(|f| f.contains(start, end))
                    .min_by_key(|f| f.len());
                let fully_uncovered = function.is_some_and(|f| {
                    let mut body = executable.range(f.body_start..=f.end).peekable();
                    body.peek().is_some() && body.all(|&line| start <= line && line <= end)
                });
                let size = end - start + 1;
                let reason = if fully_uncovered {
                    "Entire function uncovered"
                } else if size > LARGE_GAP_LINES {
                    "Large uncovered block"
                } else {
                    "Uncovered lines"
                };
                CoverageGap {
                    file: file.to_string(),
                    line_start: start,
                    line_end: end,
                    enclosing_symbol: function.map(|f| f.name.clone()),
                    is_function_fully_uncovered: fully_uncovered,
                    reason: reason.to_string(),
                }
            })
            .collect()
    }

    /// Named functions of a source file; empty when it cannot be read or parsed.
    fn functions_in(&self, file: &str) -> Vec<FunctionSpan> {
        let Some(root) = &self.source_root else {
            return Vec::new();
        };
        let path = resolve_source(root, file);
        let Some(language) = Language::from_path(&path) else {
            return Vec::new();
        };
        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) => {
                debug!("Source {} unavailable for gap symbols: {}", path.display(), e);
                return Vec::new();
            }
        };
        match parse_source(language, &source) {
            Ok(tree) => {
                let mut functions = Vec::new();
                collect_functions(&tree, None, &mut functions);
                functions
            }
            Err(e) => {
                debug!("Could not parse {} for gap symbols: {}", path.display(), e);
                Vec::new()
            }
        }
    }
}

fn resolve_source(root: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn collect_functions(node: &SyntaxNode, class: Option<&str>, out: &mut Vec<FunctionSpan>) {
    for child in &node.children {
        match child.kind {
            NodeKind::Class => {
                let name = child.text.as_deref().map(|name| match class {
                    Some(outer) => format!("{outer}.{name}"),
                    None => name.to_string(),
                });
                collect_functions(child, name.as_deref().or(class), out);
            }
            NodeKind::Function => {
                if let Some(name) = &child.text {
                    let qualified = match class {
                        Some(class) => format!("{class}.{name}"),
                        None => name.clone(),
                    };
                    out.push(FunctionSpan {
                        name: qualified,
                        start: child.start_line as u32,
                        end: child.end_line as u32,
                        body_start: body_start(child) as u32,
                    });
                }
                collect_functions(child, class, out);
            }
            _ => collect_functions(child, class, out),
        }
    }
}

/// First line of a function's body.
///
/// Brace blocks open on the header line, so the body proper starts one line
/// later unless the whole block sits on that line.
fn body_start(function: &SyntaxNode) -> usize {
    match function.body() {
        Some(block) if block.raw_kind == "statement_block" && block.start_line < block.end_line => {
            block.start_line + 1
        }
        Some(block) => block.start_line,
        None => function.start_line,
    }
}

/// Merge sorted line numbers into inclusive ranges of strictly adjacent lines.
///
/// Unsorted or duplicated input is normalized first.
pub fn merge_uncovered_lines(lines: &[u32]) -> Vec<(u32, u32)> {
    let mut sorted = lines.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for line in sorted {
        match ranges.last_mut() {
            Some((_, end)) if line == *end + 1 => *end = line,
            _ => ranges.push((line, line)),
        }
    }
    ranges
}

fn module_coverage(baseline: &CoverageRun, candidate: &CoverageRun) -> Vec<ModuleCoverage> {
    let files: BTreeSet<&String> = baseline
        .per_file_line_hits
        .keys()
        .chain(candidate.per_file_line_hits.keys())
        .collect();

    let mut modules: Vec<ModuleCoverage> = files
        .into_iter()
        .map(|file| {
            let before = baseline.file_coverage_percent(file).unwrap_or(0.0);
            let after = candidate.file_coverage_percent(file).unwrap_or(0.0);
            ModuleCoverage {
                file: file.clone(),
                before,
                after,
                change: after - before,
            }
        })
        .collect();

    modules.sort_by(|a, b| b.change.total_cmp(&a.change).then_with(|| a.file.cmp(&b.file)));
    modules
}

fn compare_gaps(a: &CoverageGap, b: &CoverageGap) -> Ordering {
    b.is_function_fully_uncovered
        .cmp(&a.is_function_fully_uncovered)
        .then_with(|| b.size().cmp(&a.size()))
        .then_with(|| a.file.cmp(&b.file))
        .then_with(|| a.line_start.cmp(&b.line_start))
}

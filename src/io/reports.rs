//! Report rendering.
//!
//! A [`QualityReport`] is serialized as JSON or YAML for machines, or
//! rendered as markdown with a fixed section layout for people.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::errors::{Result, SuiteError};
use crate::core::model::{CoverageGap, FindingKind, Language, Severity, StageName};
use crate::core::report::{QualityReport, Rating};

/// Files listed in the uncovered-sections recommendations.
const MAX_RECOMMENDED_FILES: usize = 5;
/// Function names listed per file.
const MAX_FUNCTIONS_PER_FILE: usize = 3;

/// Output formats for a rendered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Markdown,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

/// Render a report in the requested format.
pub fn render_report(report: &QualityReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Markdown => Ok(render_markdown(report)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(report)?),
    }
}

/// Render and write a report to `path`.
pub fn write_report(report: &QualityReport, format: OutputFormat, path: &Path) -> Result<()> {
    let content = render_report(report, format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| SuiteError::io(format!("Failed to create {}", parent.display()), e))?;
    }
    std::fs::write(path, content).map_err(|e| SuiteError::io(format!("Failed to write {}", path.display()), e))?;
    info!("Report written to {}", path.display());
    Ok(())
}

/// Markdown with seven fixed sections, in order: Summary, Similar Tests,
/// AI Suggestions, Redundant & Outdated Tests, Coverage by Module,
/// Uncovered Sections, Quality Score.
pub fn render_markdown(report: &QualityReport) -> String {
    let mut out = String::from("# Test Suite Quality Report\n\n");
    out.push_str(&summary_section(report));
    out.push_str(&similarity_section(report));
    out.push_str(&suggestions_section(report));
    out.push_str(&findings_section(report));
    out.push_str(&module_section(report));
    out.push_str(&gaps_section(report));
    out.push_str(&score_section(report));
    out
}

/// One-line verdict on the coverage gain in percentage points.
pub fn coverage_message(gain: f64) -> &'static str {
    if gain > 20.0 {
        "Excellent improvement! These tests significantly increased coverage."
    } else if gain > 10.0 {
        "Great work! Notable coverage improvement."
    } else if gain > 5.0 {
        "Good! Tests added meaningful coverage."
    } else if gain > 0.0 {
        "Tests added some coverage."
    } else if gain == 0.0 {
        "Coverage unchanged."
    } else {
        "Warning: Coverage decreased. Please review test execution."
    }
}

/// Per-file follow-up actions for the reported gaps.
pub fn coverage_recommendations(gaps: &[CoverageGap]) -> Vec<String> {
    let mut by_file: Vec<(&str, Vec<&CoverageGap>)> = Vec::new();
    for gap in gaps {
        match by_file.iter_mut().find(|(file, _)| *file == gap.file) {
            Some((_, file_gaps)) => file_gaps.push(gap),
            None => by_file.push((gap.file.as_str(), vec![gap])),
        }
    }

    by_file
        .into_iter()
        .take(MAX_RECOMMENDED_FILES)
        .map(|(file, file_gaps)| {
            let mut functions: Vec<&str> = Vec::new();
            for name in file_gaps.iter().filter_map(|g| g.enclosing_symbol.as_deref()) {
                if !functions.contains(&name) {
                    functions.push(name);
                }
            }
            if functions.is_empty() {
                let ranges: Vec<String> = file_gaps
                    .iter()
                    .take(2)
                    .map(|g| format!("lines {}-{}", g.line_start, g.line_end))
                    .collect();
                format!("Cover {} in `{}`", ranges.join(", "), file)
            } else {
                let names: Vec<String> = functions
                    .iter()
                    .take(MAX_FUNCTIONS_PER_FILE)
                    .map(|name| format!("`{}()`", name))
                    .collect();
                format!("Add tests for {} in `{}`", names.join(", "), file)
            }
        })
        .collect()
}

fn summary_section(report: &QualityReport) -> String {
    let mut out = String::from("## Summary\n\n");

    if !report.has_issues() && report.degraded_stages.is_empty() {
        out.push_str("All candidate tests look good! No issues detected.\n\n");
    }

    let pairs = report.similarity_pairs.len();
    if pairs > 0 {
        out.push_str(&format!(
            "- **{} similar test pair(s)** detected (threshold {:.0}%)\n",
            pairs,
            report.similarity_threshold * 100.0
        ));
    } else {
        out.push_str("- No similar tests detected\n");
    }
    out.push_str(&format!("- {} optimization suggestion(s)\n", report.suggestions.len()));
    let redundant = report.findings_of(FindingKind::Redundant).count();
    let outdated = report.findings_of(FindingKind::OutdatedImport).count();
    out.push_str(&format!("- {} redundant test(s), {} outdated import(s)\n", redundant, outdated));

    if let Some(delta) = report.coverage_delta {
        out.push_str(&format!(
            "- Coverage: {:.1}% -> {:.1}% ({:+.1}%)\n\n{}\n",
            delta.before,
            delta.after,
            delta.gain(),
            coverage_message(delta.gain())
        ));
    }

    if !report.degraded_stages.is_empty() {
        let stages: Vec<&str> = report.degraded_stages.iter().map(|s| s.as_str()).collect();
        out.push_str(&format!("\n**Degraded stages**: {}\n", stages.join(", ")));
    }
    for warning in &report.warnings {
        out.push_str(&format!("\n> Warning: {}\n", warning));
    }
    if !report.parse_failures.is_empty() {
        out.push_str("\n**Skipped (unparsable) tests**:\n");
        for failure in &report.parse_failures {
            out.push_str(&format!("- `{}`: {}\n", failure.test_id, failure.message));
        }
    }
    out.push('\n');
    out
}

fn similarity_section(report: &QualityReport) -> String {
    let mut out = String::from("## Similar Tests\n\n");
    if report.is_degraded(StageName::Similarity) {
        out.push_str("Similarity analysis did not complete.\n\n");
        return out;
    }
    if report.similarity_pairs.is_empty() {
        out.push_str("None.\n\n");
        return out;
    }

    for (i, pair) in report.similarity_pairs.iter().enumerate() {
        out.push_str(&format!("### {}. Similarity: {:.0}%\n\n", i + 1, pair.score * 100.0));
        out.push_str(&format!("**Tests**: `{}` and `{}`\n\n", pair.test_id_a, pair.test_id_b));
        out.push_str(&format!("**Recommendation**: {}\n\n", pair.recommendation));
        if let Some(code) = &pair.example_code {
            out.push_str(&format!("```{}\n{}\n```\n\n", fence_language(&pair.test_id_a), code));
        }
    }
    out
}

fn suggestions_section(report: &QualityReport) -> String {
    let mut out = String::from("## AI Suggestions\n\n");
    if report.is_degraded(StageName::Suggestions) {
        out.push_str("Suggestions are unavailable for this run.\n\n");
        return out;
    }
    if report.suggestions.is_empty() {
        out.push_str("None.\n\n");
        return out;
    }

    for (i, suggestion) in report.suggestions.iter().enumerate() {
        out.push_str(&format!("### {}. {} ({})\n\n", i + 1, suggestion.title, suggestion.category));
        if !suggestion.affected_tests.is_empty() {
            out.push_str(&format!("**Affected tests**: `{}`\n\n", suggestion.affected_tests.join("`, `")));
        }
        if !suggestion.rationale.is_empty() {
            out.push_str(&format!("**Why**: {}\n\n", suggestion.rationale));
        }
        if let Some(code) = &suggestion.code_example {
            let language = suggestion
                .affected_tests
                .first()
                .map_or("", |id| fence_language(id));
            out.push_str(&format!("```{}\n{}\n```\n\n", language, code));
        }
    }
    out
}

fn findings_section(report: &QualityReport) -> String {
    let mut out = String::from("## Redundant & Outdated Tests\n\n");
    if report.is_degraded(StageName::Redundancy) {
        out.push_str("Redundancy analysis did not complete.\n\n");
        return out;
    }
    if report.redundancy_findings.is_empty() {
        out.push_str("None.\n\n");
        return out;
    }

    let redundant: Vec<_> = report.findings_of(FindingKind::Redundant).collect();
    if !redundant.is_empty() {
        out.push_str("### Redundant Tests\n\n");
        for finding in redundant {
            out.push_str(&format!("- **{}** ({})\n", finding.test_id, finding.severity));
            out.push_str(&format!("  - Reason: {}\n", finding.reason));
            if let Some(matched) = &finding.matched_test_id {
                out.push_str(&format!("  - Covered by: `{}`\n", matched));
            }
        }
        out.push('\n');
    }

    let outdated: Vec<_> = report.findings_of(FindingKind::OutdatedImport).collect();
    if !outdated.is_empty() {
        out.push_str("### Outdated Imports\n\n");
        for finding in outdated {
            let marker = if finding.severity == Severity::High { " (likely broken)" } else { "" };
            out.push_str(&format!("- **{}** ({}){}\n", finding.test_id, finding.severity, marker));
            out.push_str(&format!("  - Issue: {}\n", finding.reason));
            if let Some(module) = &finding.missing_module {
                out.push_str(&format!("  - Fix: update or remove the import of `{}`\n", module));
            }
        }
        out.push('\n');
    }
    out
}

fn module_section(report: &QualityReport) -> String {
    let mut out = String::from("## Coverage by Module\n\n");
    if report.coverage_delta.is_none() {
        out.push_str(if report.is_degraded(StageName::Coverage) {
            "Coverage analysis did not complete.\n\n"
        } else {
            "Coverage was not measured.\n\n"
        });
        return out;
    }
    if report.module_coverage.is_empty() {
        out.push_str("No modules measured.\n\n");
        return out;
    }

    out.push_str("| Module | Before | After | Change |\n|--------|--------|-------|--------|\n");
    for module in &report.module_coverage {
        let change = if module.change == 0.0 {
            "-".to_string()
        } else {
            format!("{:+.1}%", module.change)
        };
        out.push_str(&format!(
            "| `{}` | {:.1}% | {:.1}% | {} |\n",
            module.file, module.before, module.after, change
        ));
    }
    out.push('\n');
    out
}

fn gaps_section(report: &QualityReport) -> String {
    let mut out = String::from("## Uncovered Sections\n\n");
    if report.coverage_gaps.is_empty() {
        out.push_str("None.\n\n");
        return out;
    }

    let mut by_file: BTreeMap<&str, Vec<&CoverageGap>> = BTreeMap::new();
    for gap in &report.coverage_gaps {
        by_file.entry(gap.file.as_str()).or_default().push(gap);
    }
    for (file, gaps) in by_file {
        out.push_str(&format!("### `{}`\n\n", file));
        for gap in gaps {
            let lines = if gap.line_start == gap.line_end {
                format!("Line {}", gap.line_start)
            } else {
                format!("Lines {}-{}", gap.line_start, gap.line_end)
            };
            match &gap.enclosing_symbol {
                Some(symbol) => out.push_str(&format!("- **{}**: `{}()` - {}\n", lines, symbol, gap.reason)),
                None => out.push_str(&format!("- **{}**: {}\n", lines, gap.reason)),
            }
        }
        out.push('\n');
    }

    if report.total_gap_count > report.coverage_gaps.len() {
        out.push_str(&format!(
            "Showing {} of {} gaps.\n\n",
            report.coverage_gaps.len(),
            report.total_gap_count
        ));
    }

    out.push_str("**Recommendations**:\n\n");
    for (i, recommendation) in coverage_recommendations(&report.coverage_gaps).iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, recommendation));
    }
    out.push('\n');
    out
}

fn score_section(report: &QualityReport) -> String {
    let mut out = format!("## Quality Score: {:.1}/10\n\n**Rating**: {}\n", report.score, report.rating);
    if report.rating != Rating::Excellent {
        out.push_str("\nAddressing the findings above will raise the score.\n");
    }
    out
}

fn fence_language(test_id: &str) -> &'static str {
    let file = test_id.split("::").next().unwrap_or(test_id);
    Language::from_path(Path::new(file)).map_or("", Language::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{CoverageDelta, ModuleCoverage, RedundancyFinding, SimilarityPair};
    use crate::core::report::ReportBuilder;
    use tempfile::TempDir;

    const SECTIONS: [&str; 7] = [
        "## Summary",
        "## Similar Tests",
        "## AI Suggestions",
        "## Redundant & Outdated Tests",
        "## Coverage by Module",
        "## Uncovered Sections",
        "## Quality Score",
    ];

    fn gap(file: &str, start: u32, end: u32, symbol: Option<&str>) -> CoverageGap {
        CoverageGap {
            file: file.to_string(),
            line_start: start,
            line_end: end,
            enclosing_symbol: symbol.map(str::to_string),
            is_function_fully_uncovered: symbol.is_some(),
            reason: "Uncovered lines".to_string(),
        }
    }

    fn full_report() -> QualityReport {
        ReportBuilder::new(0.7)
            .similarity_pairs(vec![SimilarityPair {
                test_id_a: "tests/test_a.py::test_x".to_string(),
                test_id_b: "tests/test_a.py::test_y".to_string(),
                score: 0.82,
                recommendation: "Combine using parametrization with @pytest.mark.parametrize".to_string(),
                example_code: Some("@pytest.mark.parametrize(...)".to_string()),
            }])
            .redundancy(
                vec![RedundancyFinding {
                    test_id: "tests/test_a.py::test_old".to_string(),
                    kind: FindingKind::OutdatedImport,
                    matched_test_id: None,
                    missing_module: Some("src.old_module".to_string()),
                    severity: Severity::High,
                    reason: "Imports missing module src.old_module".to_string(),
                }],
                Vec::new(),
            )
            .coverage(
                CoverageDelta { before: 45.2, after: 78.9 },
                vec![ModuleCoverage {
                    file: "app/auth.py".to_string(),
                    before: 0.0,
                    after: 88.1,
                    change: 88.1,
                }],
                vec![gap("app/auth.py", 120, 135, Some("reset_password"))],
                3,
            )
            .build()
    }

    #[test]
    fn test_sections_appear_in_order() {
        let markdown = render_markdown(&full_report());
        let positions: Vec<usize> = SECTIONS.iter().map(|s| markdown.find(s).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(markdown.contains("```python"));
        assert!(markdown.contains("Lines 120-135"));
        assert!(markdown.contains("Add tests for `reset_password()` in `app/auth.py`"));
        assert!(markdown.contains("Showing 1 of 3 gaps."));
        assert!(markdown.contains("Great work!") || markdown.contains("Excellent improvement!"));
    }

    #[test]
    fn test_clean_report_message() {
        let markdown = render_markdown(&ReportBuilder::new(0.7).build());
        assert!(markdown.contains("No issues detected"));
        assert!(markdown.contains("## Quality Score: 10.0/10"));
        for section in SECTIONS {
            assert!(markdown.contains(section));
        }
    }

    #[test]
    fn test_coverage_message_bands() {
        assert!(coverage_message(33.7).starts_with("Excellent"));
        assert!(coverage_message(15.0).starts_with("Great"));
        assert!(coverage_message(6.0).starts_with("Good"));
        assert_eq!(coverage_message(0.5), "Tests added some coverage.");
        assert_eq!(coverage_message(0.0), "Coverage unchanged.");
        assert!(coverage_message(-1.0).starts_with("Warning"));
    }

    #[test]
    fn test_recommendations_limit_functions() {
        let gaps = vec![
            gap("a.py", 1, 2, Some("one")),
            gap("a.py", 5, 6, Some("two")),
            gap("a.py", 9, 9, Some("three")),
            gap("a.py", 12, 14, Some("four")),
            gap("b.py", 3, 4, None),
            gap("b.py", 8, 8, None),
        ];
        let recommendations = coverage_recommendations(&gaps);
        assert_eq!(
            recommendations[0],
            "Add tests for `one()`, `two()`, `three()` in `a.py`"
        );
        assert_eq!(recommendations[1], "Cover lines 3-4, lines 8-8 in `b.py`");
    }

    #[test]
    fn test_degraded_stage_is_called_out() {
        let report = ReportBuilder::new(0.7)
            .degraded(StageName::Similarity)
            .warning("embedding service down")
            .build();
        let markdown = render_markdown(&report);
        assert!(markdown.contains("**Degraded stages**: similarity"));
        assert!(markdown.contains("Similarity analysis did not complete."));
        assert!(!markdown.contains("No issues detected"));
    }

    #[test]
    fn test_json_and_file_output() {
        let report = full_report();
        let json = render_report(&report, OutputFormat::Json).unwrap();
        let back: QualityReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.total_gap_count, 3);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/report.md");
        write_report(&report, OutputFormat::Markdown, &path).unwrap();
        assert!(std::fs::read_to_string(path).unwrap().starts_with("# Test Suite Quality Report"));
    }
}

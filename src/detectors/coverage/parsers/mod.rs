//! Coverage report parsers.
//!
//! Every supported format is folded into a [`CoverageRun`] keyed by
//! workspace-relative paths.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;
use tracing::debug;

use crate::core::errors::{Result, SuiteError};
use crate::core::model::{CoverageRun, CoverageScope};

/// Supported report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// `coverage json` / `pytest --cov-report=json`
    CoveragePyJson,
    /// `coverage-final.json` written by Istanbul/Jest
    IstanbulJson,
    /// `lcov.info`
    Lcov,
    /// Cobertura XML, also written by `coverage xml`
    Cobertura,
}

impl ReportFormat {
    /// Tool name recorded on the run.
    pub fn tool_name(self) -> &'static str {
        match self {
            Self::CoveragePyJson => "coverage.py",
            Self::IstanbulJson => "istanbul",
            Self::Lcov => "lcov",
            Self::Cobertura => "cobertura",
        }
    }
}

/// Read and parse a report file.
pub fn parse_report(path: &Path, scope: CoverageScope, workspace: &Path) -> Result<CoverageRun> {
    let bytes = fs::read(path).map_err(|err| {
        SuiteError::coverage_report(
            format!("Failed to read coverage report: {}", err),
            path.display().to_string(),
        )
    })?;

    let format = detect_format(path, &bytes).ok_or_else(|| {
        SuiteError::coverage_report("Unrecognized coverage report format", path.display().to_string())
    })?;
    debug!("Parsing {} as {:?}", path.display(), format);

    parse_report_bytes(&bytes, format, scope, workspace)
        .map_err(|err| err.with_context(format!("report {}", path.display())))
}

/// Parse report content of a known format.
pub fn parse_report_bytes(
    bytes: &[u8],
    format: ReportFormat,
    scope: CoverageScope,
    workspace: &Path,
) -> Result<CoverageRun> {
    let mut collector = HitCollector::new(workspace);
    match format {
        ReportFormat::CoveragePyJson => parse_coverage_py(bytes, &mut collector)?,
        ReportFormat::IstanbulJson => parse_istanbul(bytes, &mut collector)?,
        ReportFormat::Lcov => parse_lcov(bytes, &mut collector),
        ReportFormat::Cobertura => parse_cobertura(bytes, &mut collector)?,
    }
    Ok(collector.into_run(scope, format.tool_name()))
}

/// Guess the format from the extension and leading content.
pub fn detect_format(path: &Path, bytes: &[u8]) -> Option<ReportFormat> {
    let snippet = String::from_utf8_lossy(&bytes[..bytes.len().min(4096)]);
    let trimmed = snippet.trim_start();

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("info") | Some("lcov") => return Some(ReportFormat::Lcov),
        Some("xml") => return Some(ReportFormat::Cobertura),
        _ => {}
    }

    if trimmed.starts_with('{') {
        // coverage.py always leads with a `meta` block naming the format
        let is_coverage_py = trimmed.contains("\"executed_lines\"")
            || (trimmed.contains("\"meta\"") && trimmed.contains("\"format\""));
        return Some(if is_coverage_py {
            ReportFormat::CoveragePyJson
        } else {
            ReportFormat::IstanbulJson
        });
    }
    if trimmed.starts_with('<') {
        return Some(ReportFormat::Cobertura);
    }
    if trimmed.starts_with("TN:") || trimmed.starts_with("SF:") || trimmed.contains("\nSF:") {
        return Some(ReportFormat::Lcov);
    }
    None
}

/// Accumulates hits per workspace-relative file.
struct HitCollector {
    workspace: PathBuf,
    lines: BTreeMap<String, BTreeMap<u32, u64>>,
    branches: BTreeMap<String, BTreeMap<String, u64>>,
}

impl HitCollector {
    fn new(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            lines: BTreeMap::new(),
            branches: BTreeMap::new(),
        }
    }

    fn line(&mut self, file: &str, line: u32, hits: u64) {
        if line == 0 {
            return;
        }
        let entry = self.lines.entry(file.to_string()).or_default().entry(line).or_insert(0);
        *entry = (*entry).max(hits);
    }

    fn branch(&mut self, file: &str, branch: String, hits: u64) {
        let entry = self.branches.entry(file.to_string()).or_default().entry(branch).or_insert(0);
        *entry = (*entry).max(hits);
    }

    fn relative(&self, raw: &str) -> String {
        relativize(raw, &self.workspace)
    }

    fn into_run(self, scope: CoverageScope, tool: &str) -> CoverageRun {
        let mut run = CoverageRun::new(scope, tool);
        run.per_file_line_hits = self.lines;
        run.per_file_branch_hits = self.branches;
        run
    }
}

/// Normalize a report path to a workspace-relative, `/`-separated path.
pub fn relativize(raw: &str, workspace: &Path) -> String {
    let cleaned = raw.trim().trim_matches('"').replace('\\', "/");
    let path = Path::new(&cleaned);

    let relative = if path.is_absolute() {
        let canonical = workspace.canonicalize().ok();
        path.strip_prefix(workspace)
            .ok()
            .or_else(|| canonical.as_deref().and_then(|root| path.strip_prefix(root).ok()))
            .map(Path::to_path_buf)
            .unwrap_or_else(|| path.to_path_buf())
    } else {
        path.to_path_buf()
    };

    let text = relative.to_string_lossy().replace('\\', "/");
    text.strip_prefix("./").unwrap_or(&text).to_string()
}

#[derive(Debug, Deserialize)]
struct CoveragePyReport {
    files: BTreeMap<String, CoveragePyFile>,
}

#[derive(Debug, Deserialize)]
struct CoveragePyFile {
    #[serde(default)]
    executed_lines: Vec<u32>,
    #[serde(default)]
    missing_lines: Vec<u32>,
    #[serde(default)]
    executed_branches: Vec<(i64, i64)>,
    #[serde(default)]
    missing_branches: Vec<(i64, i64)>,
}

fn parse_coverage_py(bytes: &[u8], collector: &mut HitCollector) -> Result<()> {
    let report: CoveragePyReport = serde_json::from_slice(bytes)
        .map_err(|err| SuiteError::coverage(format!("Malformed coverage.py JSON: {}", err)))?;

    for (raw_path, file) in report.files {
        let path = collector.relative(&raw_path);
        for line in file.missing_lines {
            collector.line(&path, line, 0);
        }
        for line in file.executed_lines {
            collector.line(&path, line, 1);
        }
        for (from, to) in file.missing_branches {
            collector.branch(&path, format!("{}->{}", from, to), 0);
        }
        for (from, to) in file.executed_branches {
            collector.branch(&path, format!("{}->{}", from, to), 1);
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IstanbulFile {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    statement_map: BTreeMap<String, IstanbulRange>,
    #[serde(default)]
    s: BTreeMap<String, u64>,
    #[serde(default)]
    branch_map: BTreeMap<String, IstanbulBranch>,
    #[serde(default)]
    b: BTreeMap<String, Vec<u64>>,
}

#[derive(Debug, Deserialize)]
struct IstanbulRange {
    start: IstanbulPosition,
}

#[derive(Debug, Deserialize)]
struct IstanbulPosition {
    line: u32,
}

#[derive(Debug, Deserialize)]
struct IstanbulBranch {
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    loc: Option<IstanbulRange>,
}

fn parse_istanbul(bytes: &[u8], collector: &mut HitCollector) -> Result<()> {
    let report: BTreeMap<String, IstanbulFile> = serde_json::from_slice(bytes)
        .map_err(|err| SuiteError::coverage(format!("Malformed Istanbul JSON: {}", err)))?;

    for (key, file) in report {
        let path = collector.relative(file.path.as_deref().unwrap_or(&key));
        for (id, range) in &file.statement_map {
            let hits = file.s.get(id).copied().unwrap_or(0);
            collector.line(&path, range.start.line, hits);
        }
        for (id, counts) in &file.b {
            let line = file
                .branch_map
                .get(id)
                .and_then(|branch| branch.line.or_else(|| branch.loc.as_ref().map(|l| l.start.line)))
                .unwrap_or(0);
            for (index, &hits) in counts.iter().enumerate() {
                collector.branch(&path, format!("{}:{}.{}", line, id, index), hits);
            }
        }
    }
    Ok(())
}

fn parse_lcov(bytes: &[u8], collector: &mut HitCollector) {
    let content = String::from_utf8_lossy(bytes);
    let mut current: Option<String> = None;

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if let Some(rest) = line.strip_prefix("SF:") {
            current = Some(collector.relative(rest));
        } else if line == "end_of_record" {
            current = None;
        } else if let Some(rest) = line.strip_prefix("DA:") {
            let Some(file) = current.clone() else { continue };
            let mut parts = rest.split(',');
            let number = parts.next().and_then(|v| v.trim().parse::<u32>().ok());
            let hits = parts.next().and_then(|v| v.trim().parse::<u64>().ok());
            if let (Some(number), Some(hits)) = (number, hits) {
                collector.line(&file, number, hits);
            }
        } else if let Some(rest) = line.strip_prefix("BRDA:") {
            let Some(file) = current.clone() else { continue };
            let parts: Vec<&str> = rest.split(',').map(str::trim).collect();
            if parts.len() == 4 {
                // `-` means the branch's block never ran
                let hits = parts[3].parse::<u64>().unwrap_or(0);
                collector.branch(&file, format!("{}:{}.{}", parts[0], parts[1], parts[2]), hits);
            }
        }
    }
}

fn attribute_value(tag: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    tag.attributes()
        .with_checks(false)
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .and_then(|attr| String::from_utf8(attr.value.into_owned()).ok())
}

/// `"50% (1/2)"` to `(1, 2)`.
fn parse_condition_coverage(value: &str) -> Option<(u64, u64)> {
    let start = value.find('(')?;
    let end = value[start..].find(')')? + start;
    let (covered, total) = value[start + 1..end].split_once('/')?;
    Some((covered.trim().parse().ok()?, total.trim().parse().ok()?))
}

fn parse_cobertura(bytes: &[u8], collector: &mut HitCollector) -> Result<()> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut sources: Vec<String> = Vec::new();
    let mut in_source = false;
    let mut current: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) => match tag.name().as_ref() {
                b"source" => in_source = true,
                b"class" => {
                    current = attribute_value(&tag, b"filename").map(|name| cobertura_path(&name, &sources, collector));
                }
                b"line" => {
                    let number = attribute_value(&tag, b"number").and_then(|v| v.parse::<u32>().ok());
                    if let (Some(file), Some(number)) = (current.clone(), number) {
                        cobertura_line(collector, &tag, &file, number);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(text)) if in_source => {
                let value = text
                    .unescape()
                    .map_err(|err| SuiteError::coverage(format!("Malformed Cobertura XML: {}", err)))?;
                sources.push(value.trim().to_string());
            }
            Ok(Event::End(tag)) => match tag.name().as_ref() {
                b"source" => in_source = false,
                b"class" => current = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(SuiteError::coverage(format!("Malformed Cobertura XML: {}", err)));
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn cobertura_line(collector: &mut HitCollector, tag: &BytesStart<'_>, file: &str, number: u32) {
    let hits = attribute_value(tag, b"hits")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    collector.line(file, number, hits);

    let is_branch = attribute_value(tag, b"branch").is_some_and(|b| b.eq_ignore_ascii_case("true"));
    if !is_branch {
        return;
    }
    if let Some((covered, total)) = attribute_value(tag, b"condition-coverage")
        .as_deref()
        .and_then(parse_condition_coverage)
    {
        for index in 0..total {
            collector.branch(file, format!("{}:{}", number, index), u64::from(index < covered));
        }
    }
}

/// Resolve a class filename against the first `<source>` root it lives under.
fn cobertura_path(filename: &str, sources: &[String], collector: &HitCollector) -> String {
    let relative = collector.relative(filename);
    if Path::new(&relative).is_absolute() {
        return relative;
    }
    for source in sources {
        let joined = Path::new(source).join(&relative);
        if joined.is_absolute() {
            let candidate = collector.relative(&joined.to_string_lossy());
            if !Path::new(&candidate).is_absolute() {
                return candidate;
            }
        } else if source != "." && !source.is_empty() {
            return collector.relative(&joined.to_string_lossy());
        }
    }
    relative
}

#[cfg(test)]
mod tests;

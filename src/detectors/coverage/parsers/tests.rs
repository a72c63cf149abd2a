use super::*;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

fn workspace() -> PathBuf {
    PathBuf::from("/work/project")
}

#[test]
fn test_coverage_py_json() {
    let json = r#"{
        "meta": {"format": 2, "version": "7.4.0", "branch_coverage": true},
        "files": {
            "src/auth.py": {
                "executed_lines": [1, 2, 5],
                "missing_lines": [10, 11, 12],
                "excluded_lines": [],
                "executed_branches": [[5, 6]],
                "missing_branches": [[5, -1]]
            }
        },
        "totals": {"percent_covered": 50.0}
    }"#;
    assert_eq!(detect_format(Path::new("coverage.json"), json.as_bytes()), Some(ReportFormat::CoveragePyJson));

    let run = parse_report_bytes(json.as_bytes(), ReportFormat::CoveragePyJson, CoverageScope::Baseline, &workspace())
        .unwrap();
    assert_eq!(run.tool_name, "coverage.py");
    assert_eq!(run.executable_lines(), 6);
    assert_eq!(run.hit_lines(), 3);
    assert_eq!(run.uncovered_lines("src/auth.py"), vec![10, 11, 12]);
    assert_eq!(run.branch_coverage_percent(), Some(50.0));
}

#[test]
fn test_istanbul_statements_collapse_to_lines() {
    let json = r#"{
        "/work/project/src/app.js": {
            "path": "/work/project/src/app.js",
            "statementMap": {
                "0": {"start": {"line": 1, "column": 0}, "end": {"line": 1, "column": 10}},
                "1": {"start": {"line": 1, "column": 12}, "end": {"line": 1, "column": 20}},
                "2": {"start": {"line": 4, "column": 2}, "end": {"line": 4, "column": 9}}
            },
            "s": {"0": 3, "1": 0, "2": 0},
            "branchMap": {"0": {"line": 4, "type": "if", "locations": []}},
            "b": {"0": [1, 0]},
            "fnMap": {},
            "f": {}
        }
    }"#;
    assert_eq!(detect_format(Path::new("coverage-final.json"), json.as_bytes()), Some(ReportFormat::IstanbulJson));

    let run = parse_report_bytes(json.as_bytes(), ReportFormat::IstanbulJson, CoverageScope::Candidate, &workspace())
        .unwrap();
    let lines = &run.per_file_line_hits["src/app.js"];
    assert_eq!(lines[&1], 3);
    assert_eq!(lines[&4], 0);
    assert_eq!(run.per_file_branch_hits["src/app.js"].len(), 2);
}

#[test]
fn test_lcov_lines_and_branches() {
    let lcov = "TN:\nSF:./src/util.ts\nDA:1,1\nDA:2,0\nBRDA:2,0,0,-\nBRDA:2,0,1,4\nend_of_record\nSF:src/other.ts\nDA:7,2\nend_of_record\n";
    assert_eq!(detect_format(Path::new("lcov.info"), lcov.as_bytes()), Some(ReportFormat::Lcov));

    let run = parse_report_bytes(lcov.as_bytes(), ReportFormat::Lcov, CoverageScope::Baseline, &workspace()).unwrap();
    assert_eq!(run.per_file_line_hits.len(), 2);
    assert_eq!(run.uncovered_lines("src/util.ts"), vec![2]);
    assert_eq!(run.per_file_branch_hits["src/util.ts"]["2:0.0"], 0);
    assert_eq!(run.per_file_branch_hits["src/util.ts"]["2:0.1"], 4);
}

#[test]
fn test_cobertura_with_sources_and_conditions() {
    let xml = r#"<?xml version="1.0" ?>
        <coverage line-rate="0.5">
          <sources><source>/work/project</source></sources>
          <packages>
            <package name="app">
              <classes>
                <class name="db.py" filename="app/db.py">
                  <lines>
                    <line number="3" hits="1"/>
                    <line number="4" hits="0" branch="true" condition-coverage="50% (1/2)"/>
                  </lines>
                </class>
              </classes>
            </package>
          </packages>
        </coverage>"#;

    let run = parse_report_bytes(xml.as_bytes(), ReportFormat::Cobertura, CoverageScope::Baseline, &workspace()).unwrap();
    assert_eq!(run.file_coverage_percent("app/db.py"), Some(50.0));
    let branches = &run.per_file_branch_hits["app/db.py"];
    assert_eq!(branches["4:0"], 1);
    assert_eq!(branches["4:1"], 0);
}

#[test]
fn test_relativize_paths() {
    let root = workspace();
    assert_eq!(relativize("/work/project/src/a.py", &root), "src/a.py");
    assert_eq!(relativize("./src/a.py", &root), "src/a.py");
    assert_eq!(relativize("src\\win\\a.js", &root), "src/win/a.js");
    assert_eq!(relativize("/elsewhere/a.py", &root), "/elsewhere/a.py");
}

#[test]
fn test_parse_report_from_disk() {
    let dir = TempDir::new().unwrap();
    let mut file = NamedTempFile::new_in(dir.path()).unwrap();
    write!(file, "SF:{}/lib.js\nDA:1,0\nend_of_record\n", dir.path().display()).unwrap();

    let run = parse_report(file.path(), CoverageScope::Candidate, dir.path()).unwrap();
    assert_eq!(run.scope, CoverageScope::Candidate);
    assert_eq!(run.uncovered_lines("lib.js"), vec![1]);
}

#[test]
fn test_missing_and_garbled_reports_are_coverage_errors() {
    let dir = TempDir::new().unwrap();
    let missing = parse_report(&dir.path().join("nope.json"), CoverageScope::Baseline, dir.path()).unwrap_err();
    assert!(matches!(missing, SuiteError::Coverage { .. }));

    let garbled = parse_report_bytes(b"{not json", ReportFormat::IstanbulJson, CoverageScope::Baseline, dir.path())
        .unwrap_err();
    assert!(matches!(garbled, SuiteError::Coverage { .. }));

    assert_eq!(detect_format(Path::new("report.txt"), b"hello"), None);
}

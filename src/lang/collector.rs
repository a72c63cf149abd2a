//! Test discovery and collection.
//!
//! Walks a syntax tree for test functions (pytest/unittest) or test blocks
//! (`it`/`test` calls) and turns each one into an immutable [`TestCase`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::core::errors::{Result, SuiteError};
use crate::core::model::{Language, TestCase};
use crate::detectors::redundancy::fingerprint::assertion_fingerprint;
use crate::lang::common::{NodeKind, SyntaxNode};
use crate::lang::registry::adapter_for_file;

pub(crate) const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    "venv",
    ".venv",
    "dist",
    "build",
    "target",
    "coverage",
];

const ECMA_TEST_CALLS: &[&str] = &[
    "it", "test", "specify", "it.only", "it.skip", "test.only", "test.skip", "it.concurrent", "test.concurrent",
];

const ECMA_SUITE_CALLS: &[&str] = &["describe", "describe.only", "describe.skip", "context", "suite"];

type ImportMap = BTreeMap<String, BTreeSet<String>>;

/// Find test files below `root`, sorted by path.
pub fn discover_test_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            entry.depth() == 0 || !(name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref()))
        })
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_test_file(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

/// Whether a path looks like a test file for a supported language.
pub fn is_test_file(path: &Path) -> bool {
    let Some(language) = Language::from_path(path) else {
        return false;
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    match language {
        Language::Python => name.starts_with("test_") || name.ends_with("_test.py"),
        Language::JavaScript | Language::TypeScript => {
            name.contains(".test.")
                || name.contains(".spec.")
                || path
                    .parent()
                    .and_then(Path::file_name)
                    .is_some_and(|dir| dir == "__tests__")
        }
    }
}

/// Read and collect the tests of one file; ids use the path relative to `workspace`.
pub fn collect_from_file(path: &Path, workspace: &Path) -> Result<Vec<TestCase>> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| SuiteError::io(format!("Failed to read test file: {}", path.display()), e))?;
    let relative = path.strip_prefix(workspace).unwrap_or(path);
    let rel_path = relative.to_string_lossy().replace('\\', "/");

    let mut adapter = adapter_for_file(path)?;
    let tree = adapter.parse_tree(&source)?;
    let tests = collect_from_tree(&rel_path, &source, adapter.language(), &tree);
    debug!("Collected {} tests from {}", tests.len(), rel_path);
    Ok(tests)
}

/// Collect tests from source text.
pub fn collect_tests(source_file: &str, source: &str, language: Language) -> Result<Vec<TestCase>> {
    let tree = crate::lang::registry::parse_source(language, source)?;
    Ok(collect_from_tree(source_file, source, language, &tree))
}

fn collect_from_tree(source_file: &str, source: &str, language: Language, tree: &SyntaxNode) -> Vec<TestCase> {
    let lines: Vec<&str> = source.lines().collect();
    let mut found = Vec::new();

    let file_imports = if language.is_ecmascript() {
        let mut imports = ImportMap::new();
        collect_imports(tree, &mut imports, &|node| is_ecma_test_call(node).is_some());
        visit_ecma(tree, &mut Vec::new(), &mut found);
        imports
    } else {
        let mut imports = ImportMap::new();
        collect_imports(tree, &mut imports, &|node| node.kind == NodeKind::Function);
        visit_python(tree, &mut Vec::new(), &mut found);
        imports
    };

    let mut seen: HashMap<String, usize> = HashMap::new();
    found
        .into_iter()
        .map(|(qualified, name, node)| {
            let mut id = format!("{source_file}::{qualified}");
            let count = seen.entry(id.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                id = format!("{id}#{count}");
            }

            let code = slice_lines(&lines, node.start_line, node.end_line);
            let mut imports = file_imports.clone();
            collect_imports(node, &mut imports, &|_| false);

            let mut test = TestCase::new(source_file, name, code, language)
                .with_id(id)
                .with_lines(node.start_line, node.end_line);
            test.imported_modules = imports;
            if let Some(doc) = docstring(node) {
                test = test.with_docstring(doc);
            }
            if !node.has_error {
                test = test.with_fingerprint(assertion_fingerprint(node));
            }
            test
        })
        .collect()
}

fn visit_python<'a>(node: &'a SyntaxNode, scope: &mut Vec<String>, found: &mut Vec<(String, String, &'a SyntaxNode)>) {
    for child in &node.children {
        match child.kind {
            NodeKind::Function => {
                let name = child.text_or_empty();
                if name.starts_with("test") {
                    let mut qualified = scope.clone();
                    qualified.push(name.to_string());
                    found.push((qualified.join("."), name.to_string(), child));
                }
            }
            NodeKind::Class => {
                scope.push(child.text_or_empty().to_string());
                visit_python(child, scope, found);
                scope.pop();
            }
            _ => visit_python(child, scope, found),
        }
    }
}

/// The literal name of an `it(...)`/`test(...)` call.
fn is_ecma_test_call(node: &SyntaxNode) -> Option<&str> {
    if node.kind != NodeKind::Call || !ECMA_TEST_CALLS.contains(&node.text_or_empty()) {
        return None;
    }
    node.children
        .first()
        .filter(|first| first.kind == NodeKind::StringLiteral)
        .map(SyntaxNode::text_or_empty)
}

fn visit_ecma<'a>(node: &'a SyntaxNode, scope: &mut Vec<String>, found: &mut Vec<(String, String, &'a SyntaxNode)>) {
    for child in &node.children {
        if let Some(name) = is_ecma_test_call(child) {
            let mut qualified = scope.clone();
            qualified.push(name.to_string());
            found.push((qualified.join(" > "), name.to_string(), child));
            continue;
        }

        let suite_name = (child.kind == NodeKind::Call && ECMA_SUITE_CALLS.contains(&child.text_or_empty()))
            .then(|| child.children.first())
            .flatten()
            .filter(|first| first.kind == NodeKind::StringLiteral);
        match suite_name {
            Some(name) => {
                scope.push(name.text_or_empty().to_string());
                visit_ecma(child, scope, found);
                scope.pop();
            }
            None => visit_ecma(child, scope, found),
        }
    }
}

/// Gather imports below `node`, not descending into subtrees matching `skip`.
fn collect_imports(node: &SyntaxNode, imports: &mut ImportMap, skip: &dyn Fn(&SyntaxNode) -> bool) {
    for child in &node.children {
        if skip(child) {
            continue;
        }
        if child.kind == NodeKind::Import {
            let bindings = imports.entry(child.text_or_empty().to_string()).or_default();
            bindings.extend(child.children.iter().map(|b| b.text_or_empty().to_string()));
        } else {
            collect_imports(child, imports, skip);
        }
    }
}

fn docstring(function: &SyntaxNode) -> Option<String> {
    let statement = function.body()?.children.first()?;
    if statement.raw_kind != "expression_statement" {
        return None;
    }
    let literal = statement.children.first()?;
    (literal.kind == NodeKind::StringLiteral).then(|| literal.text_or_empty().trim().to_string())
}

fn slice_lines(lines: &[&str], start: usize, end: usize) -> String {
    let from = start.saturating_sub(1).min(lines.len());
    let to = end.min(lines.len()).max(from);
    textwrap::dedent(&lines[from..to].join("\n"))
}

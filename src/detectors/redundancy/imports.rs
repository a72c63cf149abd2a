//! Import resolution, allowlists and assertion references.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use crate::core::model::Language;
use crate::lang::common::{NodeKind, SyntaxNode};

/// Python standard library and test framework roots that are always importable.
pub const PYTHON_ALLOWLIST: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "base64", "bisect", "builtins", "collections",
    "concurrent", "configparser", "contextlib", "copy", "csv", "dataclasses", "datetime", "decimal", "difflib",
    "doctest", "email", "enum", "errno", "fnmatch", "fractions", "functools", "gc", "glob", "gzip", "hashlib",
    "heapq", "hmac", "html", "http", "importlib", "inspect", "io", "ipaddress", "itertools", "json", "logging",
    "math", "mock", "multiprocessing", "numbers", "operator", "os", "pathlib", "pickle", "platform", "pprint",
    "pytest", "queue", "random", "re", "secrets", "shutil", "signal", "socket", "sqlite3", "statistics",
    "string", "struct", "subprocess", "sys", "tempfile", "textwrap", "threading", "time", "timeit", "traceback",
    "types", "typing", "unittest", "urllib", "uuid", "warnings", "weakref", "xml", "zipfile", "zoneinfo",
];

/// Node builtins and JS test framework packages that are always importable.
pub const ECMA_ALLOWLIST: &[&str] = &[
    "assert", "buffer", "child_process", "crypto", "events", "fs", "http", "https", "net", "os", "path",
    "process", "querystring", "readline", "stream", "string_decoder", "timers", "url", "util", "worker_threads",
    "zlib", "jest", "@jest/globals", "vitest", "mocha", "chai", "sinon", "supertest",
];

/// Top-level package of a module path.
pub fn module_root(module: &str, language: Language) -> &str {
    if language.is_ecmascript() {
        let module = module.strip_prefix("node:").unwrap_or(module);
        if module.starts_with('@') {
            let mut parts = module.splitn(3, '/');
            let scope = parts.next().unwrap_or_default();
            return match parts.next() {
                Some(name) => &module[..scope.len() + 1 + name.len()],
                None => module,
            };
        }
        module.split('/').next().unwrap_or(module)
    } else {
        module.split('.').next().unwrap_or(module)
    }
}

/// Whether a module never needs a symbol-index lookup.
pub fn is_allowlisted(module: &str, language: Language, extra: &[String]) -> bool {
    if language.is_ecmascript() && module.starts_with("node:") {
        return true;
    }
    let root = module_root(module, language);
    let builtin = if language.is_ecmascript() {
        ECMA_ALLOWLIST
    } else {
        PYTHON_ALLOWLIST
    };
    builtin.contains(&root) || extra.iter().any(|allowed| allowed == root || allowed == module)
}

/// Resolve relative imports against the importing file.
///
/// Python `.helpers` in `tests/unit/test_a.py` becomes `tests.unit.helpers`;
/// JS `../src/auth.js` in `test/auth.test.js` becomes `src/auth`. Returns
/// `None` when a relative import climbs above the workspace root.
pub fn resolve_import(module: &str, source_file: &str, language: Language) -> Option<String> {
    let parent = Path::new(source_file).parent().unwrap_or_else(|| Path::new(""));

    if language.is_ecmascript() {
        if !(module.starts_with("./") || module.starts_with("../")) {
            return Some(module.to_string());
        }
        let joined = normalize_path(&parent.join(module))?;
        let text = joined.to_string_lossy().replace('\\', "/");
        return Some(strip_script_extension(&text).to_string());
    }

    if !module.starts_with('.') {
        return Some(module.to_string());
    }
    let dots = module.chars().take_while(|&c| c == '.').count();
    let rest = &module[dots..];
    let mut package: Vec<String> = parent
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    for _ in 1..dots {
        package.pop()?;
    }
    if !rest.is_empty() {
        package.push(rest.to_string());
    }
    (!package.is_empty()).then(|| package.join("."))
}

fn normalize_path(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::Normal(part) => normalized.push(part),
            _ => {}
        }
    }
    Some(normalized)
}

/// Drop a trailing `.js`/`.ts`/... extension.
pub fn strip_script_extension(path: &str) -> &str {
    for ext in [".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx", ".mts", ".cts"] {
        if let Some(stripped) = path.strip_suffix(ext) {
            return stripped;
        }
    }
    path
}

/// Imports declared inside a parsed test, merged into module -> bindings.
pub fn imports_in(tree: &SyntaxNode) -> Vec<(String, BTreeSet<String>)> {
    tree.find_all(NodeKind::Import)
        .into_iter()
        .map(|import| {
            let bindings = import
                .children
                .iter()
                .map(|b| b.text_or_empty().to_string())
                .collect();
            (import.text_or_empty().to_string(), bindings)
        })
        .collect()
}

/// Whether any name bound by `module` is used inside an assertion.
pub fn referenced_in_assertions(tree: &SyntaxNode, module: &str, bindings: &BTreeSet<String>) -> bool {
    // `import a.b` binds `a`, but only `a.b.*` uses refer to the module
    let prefixes: Vec<String> = bindings
        .iter()
        .filter(|b| b.as_str() != "*")
        .map(|binding| {
            if module.contains('.') && module.split('.').next() == Some(binding.as_str()) {
                module.to_string()
            } else {
                binding.clone()
            }
        })
        .collect();
    if prefixes.is_empty() {
        return false;
    }

    let uses = |text: &str| {
        prefixes
            .iter()
            .any(|p| text == p || text.strip_prefix(p.as_str()).is_some_and(|rest| rest.starts_with('.')))
    };

    tree.find_all(NodeKind::Assertion)
        .into_iter()
        .flat_map(SyntaxNode::descendants)
        .any(|node| match node.kind {
            NodeKind::Identifier | NodeKind::Attribute | NodeKind::Call => uses(node.text_or_empty()),
            _ => false,
        })
}

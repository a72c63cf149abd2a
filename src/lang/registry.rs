//! Factory utilities and metadata for language adapters.

use std::path::Path;

use crate::core::errors::{Result, SuiteError};
use crate::core::model::Language;
use crate::lang::common::{LanguageAdapter, SyntaxNode};
use crate::lang::javascript::JavaScriptAdapter;
use crate::lang::python::PythonAdapter;
use crate::lang::typescript::TypeScriptAdapter;

/// Metadata describing one of the built-in language adapters.
#[derive(Debug, Clone, Copy)]
pub struct LanguageInfo {
    /// Language handled
    pub language: Language,
    /// Human-friendly display name.
    pub name: &'static str,
    /// Supported file extensions (without leading dots).
    pub extensions: &'static [&'static str],
    /// Test frameworks recognized by the collector.
    pub frameworks: &'static str,
    /// Coverage tool driven by the runner.
    pub coverage_tool: &'static str,
}

const REGISTERED_LANGUAGES: &[LanguageInfo] = &[
    LanguageInfo {
        language: Language::Python,
        name: "Python",
        extensions: &["py", "pyi"],
        frameworks: "pytest, unittest",
        coverage_tool: "pytest-cov",
    },
    LanguageInfo {
        language: Language::JavaScript,
        name: "JavaScript",
        extensions: &["js", "jsx", "mjs", "cjs"],
        frameworks: "jest, vitest, mocha",
        coverage_tool: "jest --coverage",
    },
    LanguageInfo {
        language: Language::TypeScript,
        name: "TypeScript",
        extensions: &["ts", "tsx", "mts", "cts"],
        frameworks: "jest, vitest",
        coverage_tool: "jest --coverage",
    },
];

/// Return the languages that are compiled into this build.
pub fn registered_languages() -> &'static [LanguageInfo] {
    REGISTERED_LANGUAGES
}

/// Create a language adapter for a specific language.
pub fn adapter_for_language(language: Language) -> Result<Box<dyn LanguageAdapter>> {
    match language {
        Language::Python => Ok(Box::new(PythonAdapter::new()?)),
        Language::JavaScript => Ok(Box::new(JavaScriptAdapter::new()?)),
        Language::TypeScript => Ok(Box::new(TypeScriptAdapter::new()?)),
    }
}

/// Create a language adapter suitable for analysing the provided file.
pub fn adapter_for_file(path: &Path) -> Result<Box<dyn LanguageAdapter>> {
    let language = Language::from_path(path).ok_or_else(|| {
        SuiteError::validation(format!(
            "Could not determine language for file: {}",
            path.display()
        ))
    })?;

    let is_tsx = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tsx"));
    if is_tsx {
        return Ok(Box::new(TypeScriptAdapter::new_tsx()?));
    }
    adapter_for_language(language)
}

/// Parse a source string with error recovery.
pub fn parse_source(language: Language, source: &str) -> Result<SyntaxNode> {
    adapter_for_language(language)?.parse_tree(source)
}

/// Parse a source string, rejecting any syntax error.
pub fn parse_source_strict(language: Language, source: &str) -> Result<SyntaxNode> {
    adapter_for_language(language)?.parse_strict(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_adapter_for_each_language() {
        for info in registered_languages() {
            let adapter = adapter_for_language(info.language).expect("adapter");
            assert_eq!(adapter.language(), info.language);
        }
    }

    #[test]
    fn test_adapter_for_file_rejects_unknown_extension() {
        assert!(adapter_for_file(&PathBuf::from("notes.txt")).is_err());
        assert!(adapter_for_file(&PathBuf::from("App.test.tsx")).is_ok());
    }

    #[test]
    fn test_parse_source_strict_reports_language() {
        let err = parse_source_strict(Language::JavaScript, "function (").unwrap_err();
        assert!(matches!(err, SuiteError::Parse { ref language, .. } if language == "javascript"));
    }
}

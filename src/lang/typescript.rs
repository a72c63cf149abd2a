//! TypeScript language adapter with tree-sitter integration.

use tree_sitter::{Language as Grammar, Parser};

use super::common::{LanguageAdapter, SyntaxNode};
use super::javascript::EcmaConverter;
use crate::core::errors::{Result, SuiteError};
use crate::core::model::Language;

/// TypeScript adapter producing the common syntax tree.
pub struct TypeScriptAdapter {
    parser: Parser,
}

impl TypeScriptAdapter {
    /// Create a new TypeScript adapter for `.ts` sources
    pub fn new() -> Result<Self> {
        Self::with_grammar(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
    }

    /// Create a new TypeScript adapter for `.tsx` sources
    pub fn new_tsx() -> Result<Self> {
        Self::with_grammar(tree_sitter_typescript::LANGUAGE_TSX.into())
    }

    fn with_grammar(grammar: Grammar) -> Result<Self> {
        let mut parser = Parser::new();
        parser.set_language(&grammar).map_err(|e| {
            SuiteError::parse("typescript", format!("Failed to set TypeScript language: {e:?}"))
        })?;
        Ok(Self { parser })
    }
}

impl LanguageAdapter for TypeScriptAdapter {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn parse_tree(&mut self, source: &str) -> Result<SyntaxNode> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| SuiteError::parse("typescript", "Failed to parse TypeScript source code"))?;
        Ok(EcmaConverter { source: source.as_bytes() }.convert(tree.root_node()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::common::NodeKind;

    #[test]
    fn test_typed_source_parses_into_common_tree() {
        let mut adapter = TypeScriptAdapter::new().unwrap();
        let tree = adapter
            .parse_strict(
                "import { reset } from './auth';\n\nfunction check(id: number): boolean {\n  return reset(id) === true;\n}\n\nit('resets', () => {\n  expect(check(1)).toBe(true);\n});\n",
            )
            .unwrap();
        assert_eq!(tree.find_all(NodeKind::Import).len(), 1);
        let function = tree.find_all(NodeKind::Function)[0];
        assert_eq!(function.text.as_deref(), Some("check"));
        assert_eq!(tree.find_all(NodeKind::Assertion)[0].text.as_deref(), Some("toBe"));
    }
}

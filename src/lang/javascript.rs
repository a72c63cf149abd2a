//! JavaScript language adapter with tree-sitter integration.
//!
//! The node translation here is shared with the TypeScript adapter; the
//! TypeScript grammar reuses the JavaScript node names for everything the
//! common tree cares about.

use tree_sitter::{Language as Grammar, Node, Parser};

use super::common::{line_span, node_text, normalize_string_literal, LanguageAdapter, NodeKind, SyntaxNode};
use crate::core::errors::{Result, SuiteError};
use crate::core::model::Language;

/// JavaScript adapter producing the common syntax tree.
pub struct JavaScriptAdapter {
    parser: Parser,
}

impl JavaScriptAdapter {
    /// Create a new JavaScript adapter
    pub fn new() -> Result<Self> {
        let grammar: Grammar = tree_sitter_javascript::LANGUAGE.into();
        let mut parser = Parser::new();
        parser.set_language(&grammar).map_err(|e| {
            SuiteError::parse("javascript", format!("Failed to set JavaScript language: {e:?}"))
        })?;
        Ok(Self { parser })
    }
}

impl LanguageAdapter for JavaScriptAdapter {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn parse_tree(&mut self, source: &str) -> Result<SyntaxNode> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| SuiteError::parse("javascript", "Failed to parse JavaScript source code"))?;
        Ok(EcmaConverter { source: source.as_bytes() }.convert(tree.root_node()))
    }
}

const COMPARISON_OPERATORS: &[&str] = &["==", "===", "!=", "!==", "<", "<=", ">", ">=", "instanceof", "in"];

/// Translates ECMAScript-family tree-sitter nodes into [`SyntaxNode`]s.
pub(crate) struct EcmaConverter<'s> {
    pub(crate) source: &'s [u8],
}

impl EcmaConverter<'_> {
    pub(crate) fn convert(&self, node: Node<'_>) -> SyntaxNode {
        let (start, end) = line_span(&node);
        let raw = node.kind();
        let mut converted = match raw {
            "program" => self.generic(NodeKind::Module, node),
            "function_declaration" | "generator_function_declaration" | "function_expression" | "function"
            | "generator_function" | "arrow_function" | "method_definition" => self.named(NodeKind::Function, node),
            "class_declaration" | "class" | "abstract_class_declaration" => self.named(NodeKind::Class, node),
            "statement_block" | "class_body" => self.generic(NodeKind::Block, node),
            "call_expression" => self.convert_call(node),
            "import_statement" => self.convert_import(node),
            "variable_declarator" => self.convert_declarator(node),
            "binary_expression" => {
                let operator = node
                    .child_by_field_name("operator")
                    .map(|op| op.kind().to_string())
                    .unwrap_or_default();
                let kind = if COMPARISON_OPERATORS.contains(&operator.as_str()) {
                    NodeKind::Comparison
                } else {
                    NodeKind::Operation
                };
                self.generic(kind, node).with_text(operator)
            }
            "unary_expression" => {
                let operator = node
                    .child_by_field_name("operator")
                    .map(|op| op.kind().to_string())
                    .unwrap_or_default();
                self.generic(NodeKind::Operation, node).with_text(operator)
            }
            "member_expression" | "subscript_expression" => {
                SyntaxNode::new(NodeKind::Attribute, raw, start, end).with_text(node_text(&node, self.source))
            }
            "identifier" | "property_identifier" | "shorthand_property_identifier" => {
                SyntaxNode::new(NodeKind::Identifier, raw, start, end).with_text(node_text(&node, self.source))
            }
            "string" | "template_string" => SyntaxNode::new(NodeKind::StringLiteral, raw, start, end)
                .with_text(normalize_string_literal(&node_text(&node, self.source))),
            "number" => SyntaxNode::new(NodeKind::NumberLiteral, raw, start, end)
                .with_text(node_text(&node, self.source)),
            "true" | "false" => SyntaxNode::new(NodeKind::BooleanLiteral, raw, start, end).with_text(raw),
            "null" | "undefined" => SyntaxNode::new(NodeKind::NullLiteral, raw, start, end).with_text("none"),
            "array" | "object" => self.generic(NodeKind::Collection, node),
            "parenthesized_expression" | "await_expression" | "non_null_expression" => {
                match self.named_children(node).as_slice() {
                    [inner] => self.convert(*inner),
                    _ => self.generic(NodeKind::Other, node),
                }
            }
            "ERROR" => self.generic(NodeKind::Error, node),
            _ => self.generic(NodeKind::Other, node),
        };
        converted.has_error = node.has_error();
        converted
    }

    fn named_children<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor).collect()
    }

    fn generic(&self, kind: NodeKind, node: Node<'_>) -> SyntaxNode {
        let (start, end) = line_span(&node);
        let children = self
            .named_children(node)
            .into_iter()
            .map(|child| self.convert(child))
            .collect();
        SyntaxNode::new(kind, node.kind(), start, end).with_children(children)
    }

    fn named(&self, kind: NodeKind, node: Node<'_>) -> SyntaxNode {
        let converted = self.generic(kind, node);
        match node.child_by_field_name("name") {
            Some(name) => converted.with_text(node_text(&name, self.source)),
            None => converted,
        }
    }

    fn arguments<'t>(&self, call: Node<'t>) -> Vec<Node<'t>> {
        call.child_by_field_name("arguments")
            .map(|args| self.named_children(args))
            .unwrap_or_default()
    }

    /// `expect(x).not.toBe(y)` yields `Some(("not.toBe", expect-call))`.
    fn expect_chain<'t>(&self, callee: Node<'t>) -> Option<(String, Node<'t>)> {
        let mut segments = Vec::new();
        let mut current = callee;
        while current.kind() == "member_expression" {
            let property = current.child_by_field_name("property")?;
            segments.push(node_text(&property, self.source));
            current = current.child_by_field_name("object")?;
        }
        if current.kind() != "call_expression" || segments.is_empty() {
            return None;
        }
        let function = current.child_by_field_name("function")?;
        if function.kind() != "identifier" || node_text(&function, self.source) != "expect" {
            return None;
        }
        segments.reverse();
        Some((segments.join("."), current))
    }

    fn convert_call(&self, node: Node<'_>) -> SyntaxNode {
        let (start, end) = line_span(&node);
        let Some(callee) = node.child_by_field_name("function") else {
            return self.generic(NodeKind::Other, node);
        };
        let callee_text = node_text(&callee, self.source);

        if let Some((matcher, expect_call)) = self.expect_chain(callee) {
            let operands = self
                .arguments(expect_call)
                .into_iter()
                .take(1)
                .chain(self.arguments(node).into_iter().take(1))
                .map(|arg| self.convert(arg))
                .collect();
            return SyntaxNode::new(NodeKind::Assertion, node.kind(), start, end)
                .with_text(matcher)
                .with_children(operands);
        }

        let assertion_name = match callee.kind() {
            "identifier" if callee_text == "assert" => Some("assert".to_string()),
            "member_expression" => callee
                .child_by_field_name("object")
                .filter(|object| node_text(object, self.source) == "assert")
                .and_then(|_| callee.child_by_field_name("property"))
                .map(|property| node_text(&property, self.source)),
            _ => None,
        };

        let children = self
            .arguments(node)
            .into_iter()
            .map(|arg| self.convert(arg))
            .collect();

        match assertion_name {
            Some(name) => SyntaxNode::new(NodeKind::Assertion, node.kind(), start, end)
                .with_text(name)
                .with_children(children),
            None => SyntaxNode::new(NodeKind::Call, node.kind(), start, end)
                .with_text(callee_text)
                .with_children(children),
        }
    }

    fn import_node(node: &Node<'_>, module: String, bindings: Vec<String>) -> SyntaxNode {
        let (start, end) = line_span(node);
        let children = bindings
            .into_iter()
            .map(|name| SyntaxNode::new(NodeKind::Identifier, "identifier", start, end).with_text(name))
            .collect();
        SyntaxNode::new(NodeKind::Import, node.kind(), start, end)
            .with_text(module)
            .with_children(children)
    }

    fn convert_import(&self, node: Node<'_>) -> SyntaxNode {
        let module = node
            .child_by_field_name("source")
            .map(|s| normalize_string_literal(&node_text(&s, self.source)))
            .unwrap_or_default();

        let mut bindings = Vec::new();
        for clause in self.named_children(node) {
            if clause.kind() != "import_clause" {
                continue;
            }
            for part in self.named_children(clause) {
                match part.kind() {
                    "identifier" => bindings.push(node_text(&part, self.source)),
                    "namespace_import" => bindings.extend(
                        self.named_children(part)
                            .into_iter()
                            .map(|id| node_text(&id, self.source)),
                    ),
                    "named_imports" => {
                        for specifier in self.named_children(part) {
                            let bound = specifier
                                .child_by_field_name("alias")
                                .or_else(|| specifier.child_by_field_name("name"));
                            if let Some(bound) = bound {
                                bindings.push(node_text(&bound, self.source));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        Self::import_node(&node, module, bindings)
    }

    /// `const x = require('m')` is an import; `const f = () => {}` names the function.
    fn convert_declarator(&self, node: Node<'_>) -> SyntaxNode {
        let name = node.child_by_field_name("name");
        let value = node.child_by_field_name("value");

        if let (Some(name), Some(value)) = (name, value) {
            if let Some(module) = self.required_module(value) {
                return Self::import_node(&node, module, self.pattern_bindings(name));
            }
        }

        let mut converted = self.generic(NodeKind::Other, node);
        if let Some(name) = name {
            let name_text = node_text(&name, self.source);
            for child in &mut converted.children {
                if child.kind == NodeKind::Function && child.text.is_none() {
                    child.text = Some(name_text.clone());
                }
            }
        }
        converted
    }

    fn required_module(&self, value: Node<'_>) -> Option<String> {
        if value.kind() != "call_expression" {
            return None;
        }
        let function = value.child_by_field_name("function")?;
        if function.kind() != "identifier" || node_text(&function, self.source) != "require" {
            return None;
        }
        let first = self.arguments(value).into_iter().next()?;
        (first.kind() == "string").then(|| normalize_string_literal(&node_text(&first, self.source)))
    }

    fn pattern_bindings(&self, pattern: Node<'_>) -> Vec<String> {
        match pattern.kind() {
            "identifier" => vec![node_text(&pattern, self.source)],
            "object_pattern" => self
                .named_children(pattern)
                .into_iter()
                .filter_map(|prop| match prop.kind() {
                    "shorthand_property_identifier_pattern" => Some(node_text(&prop, self.source)),
                    "pair_pattern" => prop.child_by_field_name("value").map(|v| node_text(&v, self.source)),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> SyntaxNode {
        JavaScriptAdapter::new().unwrap().parse_tree(source).unwrap()
    }

    #[test]
    fn test_expect_chain_becomes_assertion() {
        let tree = parse("expect(resetPassword(user)).not.toBe(false);\n");
        let assertions = tree.find_all(NodeKind::Assertion);
        assert_eq!(assertions.len(), 1);
        assert_eq!(assertions[0].text.as_deref(), Some("not.toBe"));
        assert_eq!(assertions[0].children.len(), 2);
        assert_eq!(assertions[0].children[0].kind, NodeKind::Call);
        assert_eq!(assertions[0].children[0].text.as_deref(), Some("resetPassword"));
        assert_eq!(assertions[0].children[1].kind, NodeKind::BooleanLiteral);
    }

    #[test]
    fn test_node_assert_module() {
        let tree = parse("assert.strictEqual(total(1, 2), 3);\nassert(ok);\n");
        let names: Vec<&str> = tree
            .find_all(NodeKind::Assertion)
            .iter()
            .map(|a| a.text_or_empty())
            .collect();
        assert_eq!(names, vec!["strictEqual", "assert"]);
    }

    #[test]
    fn test_imports_and_require() {
        let tree = parse(
            "import svc, { reset as r, login } from './auth/service';\nimport * as lib from 'lib';\nconst { a, b: c } = require(\"../util\");\n",
        );
        let imports = tree.find_all(NodeKind::Import);
        let modules: Vec<&str> = imports.iter().map(|i| i.text_or_empty()).collect();
        assert_eq!(modules, vec!["./auth/service", "lib", "../util"]);
        let first: Vec<&str> = imports[0].children.iter().map(|c| c.text_or_empty()).collect();
        assert_eq!(first, vec!["svc", "r", "login"]);
        let third: Vec<&str> = imports[2].children.iter().map(|c| c.text_or_empty()).collect();
        assert_eq!(third, vec!["a", "c"]);
    }

    #[test]
    fn test_arrow_function_named_from_declarator() {
        let tree = parse("const compute = (a) => {\n  return a + 1;\n};\n");
        let function = tree.find_all(NodeKind::Function)[0];
        assert_eq!(function.text.as_deref(), Some("compute"));
        assert!(function.body().is_some());
    }

    #[test]
    fn test_test_blocks_are_calls() {
        let tree = parse("describe('auth', () => {\n  it('logs in', () => {\n    expect(login()).toBe(true);\n  });\n});\n");
        let calls: Vec<&str> = tree
            .find_all(NodeKind::Call)
            .iter()
            .map(|c| c.text_or_empty())
            .collect();
        assert_eq!(calls, vec!["describe", "it", "login"]);
    }
}

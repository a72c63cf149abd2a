//! Python language adapter with tree-sitter integration.

use tree_sitter::{Language as Grammar, Node, Parser};

use super::common::{line_span, node_text, normalize_string_literal, LanguageAdapter, NodeKind, SyntaxNode};
use crate::core::errors::{Result, SuiteError};
use crate::core::model::Language;

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> SyntaxNode {
        PythonAdapter::new().unwrap().parse_tree(source).unwrap()
    }

    #[test]
    fn test_python_adapter_creation() {
        assert!(PythonAdapter::new().is_ok(), "Should create Python adapter successfully");
    }

    #[test]
    fn test_function_and_body_lines() {
        let tree = parse("def reset(user):\n    user.token = None\n    return user\n");
        let functions = tree.find_all(NodeKind::Function);
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].text.as_deref(), Some("reset"));
        assert_eq!((functions[0].start_line, functions[0].end_line), (1, 3));
        let body = functions[0].body().expect("body");
        assert_eq!((body.start_line, body.end_line), (2, 3));
    }

    #[test]
    fn test_decorated_function_starts_at_decorator() {
        let tree = parse("@pytest.mark.slow\ndef test_x():\n    assert f() == 1\n");
        let function = tree.find_all(NodeKind::Function)[0];
        assert_eq!(function.start_line, 1);
        assert_eq!(function.text.as_deref(), Some("test_x"));
    }

    #[test]
    fn test_assert_statement_keeps_condition_only() {
        let tree = parse("assert total(items) == 3, \"bad total\"\n");
        let assertions = tree.find_all(NodeKind::Assertion);
        assert_eq!(assertions.len(), 1);
        assert_eq!(assertions[0].text.as_deref(), Some("assert"));
        assert_eq!(assertions[0].children.len(), 1);
        let comparison = &assertions[0].children[0];
        assert_eq!(comparison.kind, NodeKind::Comparison);
        assert_eq!(comparison.text.as_deref(), Some("=="));
        assert_eq!(comparison.children[0].kind, NodeKind::Call);
        assert_eq!(comparison.children[1].kind, NodeKind::NumberLiteral);
    }

    #[test]
    fn test_unittest_assertion_call() {
        let tree = parse("self.assertEqual(svc.reset(u), 'ok')\n");
        let assertion = tree.find_all(NodeKind::Assertion)[0];
        assert_eq!(assertion.text.as_deref(), Some("assertEqual"));
        assert_eq!(assertion.children.len(), 2);
        assert_eq!(assertion.children[1].text.as_deref(), Some("ok"));
    }

    #[test]
    fn test_imports_and_bindings() {
        let tree = parse("import os.path, json as j\nfrom src.old_module import reset_password, helper as h\nfrom . import local\n");
        let imports = tree.find_all(NodeKind::Import);
        let modules: Vec<&str> = imports.iter().map(|i| i.text_or_empty()).collect();
        assert_eq!(modules, vec!["os.path", "json", "src.old_module", "."]);
        let bindings: Vec<&str> = imports[2].children.iter().map(|c| c.text_or_empty()).collect();
        assert_eq!(bindings, vec!["reset_password", "h"]);
        assert_eq!(imports[1].children[0].text.as_deref(), Some("j"));
        assert_eq!(imports[0].children[0].text.as_deref(), Some("os"));
    }

    #[test]
    fn test_literals_normalized() {
        let tree = parse("x = [True, None, 'a', 2.5]\n");
        let kinds: Vec<NodeKind> = tree
            .find_all(NodeKind::Collection)[0]
            .children
            .iter()
            .map(|c| c.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::BooleanLiteral,
                NodeKind::NullLiteral,
                NodeKind::StringLiteral,
                NodeKind::NumberLiteral
            ]
        );
    }

    #[test]
    fn test_syntax_error_is_flagged() {
        let mut adapter = PythonAdapter::new().unwrap();
        let tree = adapter.parse_tree("def broken(:\n    pass\n").unwrap();
        assert!(tree.has_error);
        assert!(adapter.parse_strict("def broken(:\n    pass\n").is_err());
        assert!(adapter.parse_strict("def fine():\n    pass\n").is_ok());
    }
}

/// Python adapter producing the common syntax tree.
pub struct PythonAdapter {
    parser: Parser,
}

impl PythonAdapter {
    /// Create a new Python adapter
    pub fn new() -> Result<Self> {
        let grammar: Grammar = tree_sitter_python::LANGUAGE.into();
        let mut parser = Parser::new();
        parser.set_language(&grammar).map_err(|e| {
            SuiteError::parse("python", format!("Failed to set Python language: {e:?}"))
        })?;

        Ok(Self { parser })
    }

    fn convert(&self, node: Node<'_>, source: &[u8]) -> SyntaxNode {
        let (start, end) = line_span(&node);
        let raw = node.kind();
        let mut converted = match raw {
            "module" => self.generic(NodeKind::Module, node, source),
            "function_definition" => self.named(NodeKind::Function, node, source),
            "class_definition" => self.named(NodeKind::Class, node, source),
            "decorated_definition" => match node.child_by_field_name("definition") {
                Some(definition) => {
                    let mut inner = self.convert(definition, source);
                    inner.start_line = start;
                    inner
                }
                None => self.generic(NodeKind::Other, node, source),
            },
            "block" => self.generic(NodeKind::Block, node, source),
            "assert_statement" => {
                let condition: Vec<SyntaxNode> = self
                    .named_children(node)
                    .into_iter()
                    .take(1)
                    .map(|child| self.convert(child, source))
                    .collect();
                SyntaxNode::new(NodeKind::Assertion, raw, start, end)
                    .with_text("assert")
                    .with_children(condition)
            }
            "call" => self.convert_call(node, source),
            "import_statement" => self.convert_import(node, source),
            "import_from_statement" => self.convert_from_import(node, source),
            "comparison_operator" => {
                let mut cursor = node.walk();
                let operators: Vec<String> = node
                    .children(&mut cursor)
                    .filter(|child| !child.is_named())
                    .map(|child| child.kind().to_string())
                    .collect();
                self.generic(NodeKind::Comparison, node, source)
                    .with_text(operators.first().cloned().unwrap_or_default())
            }
            "binary_operator" | "boolean_operator" | "unary_operator" => {
                let operator = node
                    .child_by_field_name("operator")
                    .map(|op| op.kind().to_string())
                    .unwrap_or_default();
                self.generic(NodeKind::Operation, node, source).with_text(operator)
            }
            "not_operator" => self.generic(NodeKind::Operation, node, source).with_text("not"),
            "attribute" => SyntaxNode::new(NodeKind::Attribute, raw, start, end)
                .with_text(node_text(&node, source)),
            "identifier" => SyntaxNode::new(NodeKind::Identifier, raw, start, end)
                .with_text(node_text(&node, source)),
            "string" | "concatenated_string" => SyntaxNode::new(NodeKind::StringLiteral, raw, start, end)
                .with_text(normalize_string_literal(&node_text(&node, source))),
            "integer" | "float" => SyntaxNode::new(NodeKind::NumberLiteral, raw, start, end)
                .with_text(node_text(&node, source)),
            "true" | "false" => SyntaxNode::new(NodeKind::BooleanLiteral, raw, start, end)
                .with_text(raw),
            "none" => SyntaxNode::new(NodeKind::NullLiteral, raw, start, end).with_text("none"),
            "list" | "tuple" | "dictionary" | "set" | "list_comprehension" | "dictionary_comprehension"
            | "set_comprehension" => self.generic(NodeKind::Collection, node, source),
            "parenthesized_expression" => match self.named_children(node).as_slice() {
                [inner] => self.convert(*inner, source),
                _ => self.generic(NodeKind::Other, node, source),
            },
            "ERROR" => self.generic(NodeKind::Error, node, source),
            _ => self.generic(NodeKind::Other, node, source),
        };
        converted.has_error = node.has_error();
        converted
    }

    fn named_children<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor).collect()
    }

    fn generic(&self, kind: NodeKind, node: Node<'_>, source: &[u8]) -> SyntaxNode {
        let (start, end) = line_span(&node);
        let children = self
            .named_children(node)
            .into_iter()
            .map(|child| self.convert(child, source))
            .collect();
        SyntaxNode::new(kind, node.kind(), start, end).with_children(children)
    }

    fn named(&self, kind: NodeKind, node: Node<'_>, source: &[u8]) -> SyntaxNode {
        let converted = self.generic(kind, node, source);
        match node.child_by_field_name("name") {
            Some(name) => converted.with_text(node_text(&name, source)),
            None => converted,
        }
    }

    fn convert_call(&self, node: Node<'_>, source: &[u8]) -> SyntaxNode {
        let (start, end) = line_span(&node);
        let callee = node
            .child_by_field_name("function")
            .map(|f| node_text(&f, source))
            .unwrap_or_default();
        let arguments = node
            .child_by_field_name("arguments")
            .map(|args| self.named_children(args))
            .unwrap_or_default();
        let leaf = callee.rsplit('.').next().unwrap_or_default().to_string();

        let is_assertion = leaf.starts_with("assert")
            || (leaf == "raises" && callee.starts_with("pytest"));
        if is_assertion {
            // mock-style `sender.assert_called_with(x)` asserts on the receiver
            let receiver = callee
                .rsplit_once('.')
                .map(|(receiver, _)| receiver)
                .filter(|receiver| !matches!(*receiver, "self" | "cls" | "pytest"))
                .map(|receiver| {
                    let kind = if receiver.contains('.') { NodeKind::Attribute } else { NodeKind::Identifier };
                    SyntaxNode::new(kind, "receiver", start, start).with_text(receiver)
                });
            let operands = receiver
                .into_iter()
                .chain(
                    arguments
                        .into_iter()
                        .filter(|arg| !matches!(arg.kind(), "keyword_argument" | "list_splat" | "dictionary_splat"))
                        .map(|arg| self.convert(arg, source)),
                )
                .collect();
            return SyntaxNode::new(NodeKind::Assertion, node.kind(), start, end)
                .with_text(leaf)
                .with_children(operands);
        }

        let children = arguments
            .into_iter()
            .map(|arg| self.convert(arg, source))
            .collect();
        SyntaxNode::new(NodeKind::Call, node.kind(), start, end)
            .with_text(callee)
            .with_children(children)
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

    /// `import a.b, c as d` becomes one import node per name.
    fn convert_import(&self, node: Node<'_>, source: &[u8]) -> SyntaxNode {
        let mut cursor = node.walk();
        let mut imports: Vec<SyntaxNode> = node
            .children_by_field_name("name", &mut cursor)
            .filter_map(|name| match name.kind() {
                "dotted_name" => {
                    let module = node_text(&name, source);
                    let binding = module.split('.').next().unwrap_or_default().to_string();
                    Some(Self::import_node(&node, module, vec![binding]))
                }
                "aliased_import" => {
                    let module = name.child_by_field_name("name").map(|n| node_text(&n, source))?;
                    let alias = name.child_by_field_name("alias").map(|a| node_text(&a, source))?;
                    Some(Self::import_node(&node, module, vec![alias]))
                }
                _ => None,
            })
            .collect();

        if imports.len() == 1 {
            return imports.remove(0);
        }
        let (start, end) = line_span(&node);
        SyntaxNode::new(NodeKind::Other, node.kind(), start, end).with_children(imports)
    }

    fn convert_from_import(&self, node: Node<'_>, source: &[u8]) -> SyntaxNode {
        let module = node
            .child_by_field_name("module_name")
            .map(|m| node_text(&m, source))
            .unwrap_or_default();

        let mut cursor = node.walk();
        let mut bindings: Vec<String> = node
            .children_by_field_name("name", &mut cursor)
            .filter_map(|name| match name.kind() {
                "aliased_import" => name.child_by_field_name("alias").map(|a| node_text(&a, source)),
                _ => Some(node_text(&name, source)),
            })
            .collect();

        let mut cursor = node.walk();
        if node
            .named_children(&mut cursor)
            .any(|child| child.kind() == "wildcard_import")
        {
            bindings.push("*".to_string());
        }

        Self::import_node(&node, module, bindings)
    }
}

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn parse_tree(&mut self, source: &str) -> Result<SyntaxNode> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| SuiteError::parse("python", "Failed to parse Python source code"))?;
        Ok(self.convert(tree.root_node(), source.as_bytes()))
    }
}

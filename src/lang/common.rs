//! Language-neutral syntax tree shared by every adapter.
//!
//! Adapters translate a tree-sitter parse into [`SyntaxNode`]s; the collector,
//! the redundancy detector and the gap analyzer only ever look at this tree.

use tree_sitter::Node;

use crate::core::errors::{Result, SuiteError};
use crate::core::model::Language;

/// Kind tag of a [`SyntaxNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// File root
    Module,
    /// Class or class-like declaration; `text` is the name
    Class,
    /// Function, method or arrow function; `text` is the name when known
    Function,
    /// Statement block (function or class body)
    Block,
    /// An assertion; `text` is the assertion name, children are operands in order
    Assertion,
    /// A call; `text` is the callee as written, children are arguments
    Call,
    /// An import; `text` is the module path, children are bound identifiers
    Import,
    /// Comparison; `text` is the operator
    Comparison,
    /// Any other unary/binary/boolean operation; `text` is the operator
    Operation,
    /// Member access; `text` is the dotted path as written
    Attribute,
    /// Bare name
    Identifier,
    /// String literal; `text` is the unquoted value
    StringLiteral,
    /// Numeric literal
    NumberLiteral,
    /// `true` / `false`, lowercased
    BooleanLiteral,
    /// `None` / `null` / `undefined`
    NullLiteral,
    /// List, tuple, dict, set, array or object literal
    Collection,
    /// Syntax error recovered by the parser
    Error,
    /// Anything else; `raw_kind` carries the grammar's name
    Other,
}

/// Node of the common syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxNode {
    /// Normalized kind
    pub kind: NodeKind,
    /// Grammar node kind as produced by the parser
    pub raw_kind: String,
    /// Kind-dependent payload (name, operator, literal value, module path)
    pub text: Option<String>,
    /// First line (1-based)
    pub start_line: usize,
    /// Last line (1-based)
    pub end_line: usize,
    /// Whether this subtree contains a syntax error
    pub has_error: bool,
    /// Child nodes in source order
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    /// Create a childless node.
    pub fn new(kind: NodeKind, raw_kind: impl Into<String>, start_line: usize, end_line: usize) -> Self {
        Self {
            kind,
            raw_kind: raw_kind.into(),
            text: None,
            start_line,
            end_line,
            has_error: false,
            children: Vec::new(),
        }
    }

    /// Set the payload text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the children.
    pub fn with_children(mut self, children: Vec<SyntaxNode>) -> Self {
        self.children = children;
        self
    }

    /// Payload text or the empty string.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Pre-order traversal including `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// All nodes of the given kind, in source order.
    pub fn find_all(&self, kind: NodeKind) -> Vec<&SyntaxNode> {
        self.descendants().filter(|node| node.kind == kind).collect()
    }

    /// The body block of a function or class.
    pub fn body(&self) -> Option<&SyntaxNode> {
        self.children.iter().find(|child| child.kind == NodeKind::Block)
    }

    /// Whether `[start, end]` lies inside this node's line range.
    pub fn contains_lines(&self, start: usize, end: usize) -> bool {
        self.start_line <= start && end <= self.end_line
    }

    /// Number of lines spanned.
    pub fn line_span(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Whether this node is a literal constant.
    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::StringLiteral | NodeKind::NumberLiteral | NodeKind::BooleanLiteral | NodeKind::NullLiteral
        )
    }

    /// First line of a recovered syntax error, if any.
    pub fn first_error_line(&self) -> Option<usize> {
        if !self.has_error {
            return None;
        }
        self.descendants()
            .find(|node| node.kind == NodeKind::Error)
            .map_or(Some(self.start_line), |node| Some(node.start_line))
    }
}

/// Pre-order iterator over a [`SyntaxNode`] tree.
pub struct Descendants<'a> {
    stack: Vec<&'a SyntaxNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a SyntaxNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Translates source text of one language into the common tree.
pub trait LanguageAdapter: Send {
    /// Language handled by this adapter.
    fn language(&self) -> Language;

    /// Parse with error recovery; syntax errors are flagged on the nodes.
    fn parse_tree(&mut self, source: &str) -> Result<SyntaxNode>;

    /// Parse and reject sources containing any syntax error.
    fn parse_strict(&mut self, source: &str) -> Result<SyntaxNode> {
        let tree = self.parse_tree(source)?;
        if let Some(line) = tree.first_error_line() {
            return Err(SuiteError::Parse {
                language: self.language().as_str().to_string(),
                message: format!("syntax error near line {line}"),
                file_path: None,
                line: Some(line),
            });
        }
        Ok(tree)
    }
}

/// 1-based line span of a tree-sitter node.
pub(crate) fn line_span(node: &Node<'_>) -> (usize, usize) {
    (node.start_position().row + 1, node.end_position().row + 1)
}

/// Source text of a tree-sitter node.
pub(crate) fn node_text(node: &Node<'_>, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or_default().to_string()
}

/// Strip prefixes and quotes from a string literal as written.
pub fn normalize_string_literal(raw: &str) -> String {
    let trimmed = raw.trim();
    let body = trimmed.trim_start_matches(|c: char| matches!(c, 'r' | 'R' | 'b' | 'B' | 'f' | 'F' | 'u' | 'U'));
    for quote in ["\"\"\"", "'''", "\"", "'", "`"] {
        if body.len() >= quote.len() * 2 && body.starts_with(quote) && body.ends_with(quote) {
            return body[quote.len()..body.len() - quote.len()].to_string();
        }
    }
    trimmed.to_string()
}

//! Assertion fingerprints.
//!
//! Every assertion is reduced to `(kind, left shape, right literal)`:
//! assertion styles are mapped to one canonical kind, operand shapes drop
//! variable names, and expected values keep only their normalized literal.
//! Assertions over constants only (`assertTrue(True)`) are dropped.

use crate::core::model::{AssertionTriple, Fingerprint};
use crate::lang::common::{NodeKind, SyntaxNode};

/// Chai language chains that carry no meaning of their own.
const CHAIN_FILLERS: &[&str] = &[
    "to", "be", "been", "is", "that", "which", "and", "has", "have", "with", "at", "of", "same", "does", "still",
    "also", "deep", "resolves", "rejects",
];

/// Fingerprint of every assertion below `tree`.
pub fn assertion_fingerprint(tree: &SyntaxNode) -> Fingerprint {
    tree.find_all(NodeKind::Assertion)
        .into_iter()
        .filter_map(assertion_triple)
        .collect()
}

/// Normalize one assertion node; `None` when the assertion is degenerate.
pub fn assertion_triple(assertion: &SyntaxNode) -> Option<AssertionTriple> {
    let name = assertion.text_or_empty();
    let operands: Vec<&SyntaxNode> = assertion.children.iter().collect();

    let (kind, left, right) = if name == "assert" && operands.len() == 1 {
        bare_assert(operands[0])
    } else {
        let kind = canonical_kind(name);
        let (left, right) = if matches!(name, "assertIn" | "assertNotIn") {
            (operands.get(1).copied(), operands.first().copied())
        } else {
            (operands.first().copied(), operands.get(1).copied())
        };
        (kind, left, right)
    };

    if is_constant(left) && is_constant(right) {
        return None;
    }

    let left_shape = left.map(shape).unwrap_or_default();
    let right_literal = right.map(literal).unwrap_or_default();
    let (kind, right_literal) = fold_constant_comparison(kind, right_literal);

    Some(AssertionTriple {
        kind,
        left_shape,
        right_literal,
    })
}

/// `assert a == b`, `assert x in y`, `assert not x`, `assert x`.
fn bare_assert(condition: &SyntaxNode) -> (String, Option<&SyntaxNode>, Option<&SyntaxNode>) {
    match condition.kind {
        NodeKind::Comparison if condition.children.len() >= 2 => {
            let left = &condition.children[0];
            let right = &condition.children[1];
            let op = condition.text_or_empty();
            match op {
                "in" => ("contains".to_string(), Some(right), Some(left)),
                "not in" => ("not_contains".to_string(), Some(right), Some(left)),
                _ => (comparison_kind(op), Some(left), Some(right)),
            }
        }
        NodeKind::Operation if condition.text_or_empty() == "not" && condition.children.len() == 1 => {
            ("falsy".to_string(), condition.children.first(), None)
        }
        _ => ("truthy".to_string(), Some(condition), None),
    }
}

fn comparison_kind(op: &str) -> String {
    match op {
        "==" | "===" => "eq",
        "!=" | "!==" => "ne",
        "<" => "lt",
        "<=" => "le",
        ">" => "gt",
        ">=" => "ge",
        "is" => "is",
        "is not" => "is_not",
        "instanceof" => "instance",
        other => other,
    }
    .to_string()
}

/// Map an assertion name from any supported framework to a canonical kind.
pub fn canonical_kind(name: &str) -> String {
    let segments: Vec<String> = name
        .split('.')
        .map(str::to_ascii_lowercase)
        .filter(|segment| !CHAIN_FILLERS.contains(&segment.as_str()))
        .collect();
    let joined = segments.join(".");

    let kind = match joined.as_str() {
        "assertequal" | "assertequals" | "tobe" | "toequal" | "tostrictequal" | "equal" | "equals" | "strictequal"
        | "deepequal" | "deepstrictequal" | "eql" | "assertdictequal" | "assertlistequal" | "asserttupleequal"
        | "assertsetequal" | "assertmultilineequal" | "assertcountequal" => "eq",
        "assertalmostequal" | "tobecloseto" | "closeto" | "approximately" => "approx",
        "assertnotequal" | "assertnotequals" | "notequal" | "notstrictequal" | "notdeepequal"
        | "notdeepstrictequal" | "not.tobe" | "not.toequal" | "not.tostrictequal" | "not.equal" | "not.eql" => "ne",
        "asserttrue" | "tobetruthy" | "ok" | "assert" | "not.tobefalsy" => "truthy",
        "assertfalse" | "tobefalsy" | "not.tobetruthy" | "not.ok" => "falsy",
        "assertisnone" | "tobenull" | "tobeundefined" | "not.tobedefined" => "none",
        "assertisnotnone" | "not.tobenull" | "tobedefined" | "not.tobeundefined" => "not_none",
        "assertin" | "tocontain" | "tocontainequal" | "include" | "includes" | "contain" => "contains",
        "assertnotin" | "not.tocontain" | "not.tocontainequal" | "not.include" => "not_contains",
        "assertraises" | "assertraisesregex" | "raises" | "tothrow" | "tothrowerror" | "throws" | "throw" => {
            "raises"
        }
        "not.tothrow" | "doesnotthrow" | "not.throw" => "not_raises",
        "assertgreater" | "tobegreaterthan" | "above" | "isabove" => "gt",
        "assertgreaterequal" | "tobegreaterthanorequal" | "least" => "ge",
        "assertless" | "tobelessthan" | "below" | "isbelow" => "lt",
        "assertlessequal" | "tobelessthanorequal" | "most" => "le",
        "assertisinstance" | "tobeinstanceof" | "instanceof" | "an" | "a" => "instance",
        "tohavelength" | "lengthof" | "length" => "length",
        "assert_called" | "assert_called_once" | "tohavebeencalled" | "tohavebeencalledtimes" | "called" => {
            "called"
        }
        "assert_called_with" | "assert_called_once_with" | "assert_any_call" | "tohavebeencalledwith"
        | "tohavebeenlastcalledwith" | "calledwith" => "called_with",
        "assert_not_called" | "not.tohavebeencalled" => "not_called",
        "assertregex" | "assertregexpmatches" | "tomatch" | "match" => "match",
        "tohaveproperty" | "property" => "property",
        _ => return joined,
    };
    kind.to_string()
}

/// `eq(x, true)` is `truthy(x)`, `eq(x, None)` is `none(x)`, and so on.
fn fold_constant_comparison(kind: String, right: String) -> (String, String) {
    let folded = match (kind.as_str(), right.as_str()) {
        ("eq" | "is", "bool:true") | ("ne" | "is_not", "bool:false") => Some("truthy"),
        ("eq" | "is", "bool:false") | ("ne" | "is_not", "bool:true") => Some("falsy"),
        ("eq" | "is", "none") => Some("none"),
        ("ne" | "is_not", "none") => Some("not_none"),
        _ => None,
    };
    match folded {
        Some(kind) => (kind.to_string(), String::new()),
        None => (kind, right),
    }
}

fn is_constant(node: Option<&SyntaxNode>) -> bool {
    match node {
        None => true,
        Some(node) if node.is_literal() => true,
        Some(node) if node.kind == NodeKind::Collection => node.children.iter().all(|c| is_constant(Some(c))),
        Some(_) => false,
    }
}

fn leaf_name(text: &str) -> &str {
    let trimmed = text.trim_end_matches(|c| c == ')' || c == '(');
    trimmed.rsplit('.').next().unwrap_or(trimmed)
}

/// Structural shape of an operand with variable names erased.
pub fn shape(node: &SyntaxNode) -> String {
    match node.kind {
        NodeKind::Identifier => "name".to_string(),
        NodeKind::Attribute => format!("attr:{}", leaf_name(node.text_or_empty())),
        NodeKind::Call => format!("call:{}/{}", leaf_name(node.text_or_empty()), node.children.len()),
        NodeKind::StringLiteral => "lit:str".to_string(),
        NodeKind::NumberLiteral => "lit:num".to_string(),
        NodeKind::BooleanLiteral => "lit:bool".to_string(),
        NodeKind::NullLiteral => "lit:none".to_string(),
        NodeKind::Collection => format!("collection/{}", node.children.len()),
        NodeKind::Comparison | NodeKind::Operation => {
            let operands: Vec<String> = node.children.iter().map(shape).collect();
            format!("op:{}({})", node.text_or_empty(), operands.join(","))
        }
        _ => node.raw_kind.clone(),
    }
}

/// Normalized literal value, or `~shape` for non-literal operands.
pub fn literal(node: &SyntaxNode) -> String {
    match node.kind {
        NodeKind::StringLiteral => format!("str:{}", node.text_or_empty()),
        NodeKind::NumberLiteral => format!("num:{}", node.text_or_empty()),
        NodeKind::BooleanLiteral => format!("bool:{}", node.text_or_empty().to_ascii_lowercase()),
        NodeKind::NullLiteral => "none".to_string(),
        NodeKind::Collection if is_constant(Some(node)) => {
            let items: Vec<String> = node.children.iter().map(literal).collect();
            format!("[{}]", items.join(","))
        }
        _ => format!("~{}", shape(node)),
    }
}

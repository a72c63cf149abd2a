//! Redundant test and outdated import detection.
//!
//! Candidates are parsed into the common syntax tree, reduced to assertion
//! fingerprints and compared against the existing corpus. Imports that the
//! symbol index no longer knows are reported as outdated.

pub mod fingerprint;
pub mod imports;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::core::config::EngineConfig;
use crate::core::model::{
    FindingKind, Fingerprint, Language, ParseFailure, RedundancyFinding, Severity, TestCase,
};
use crate::lang::common::SyntaxNode;
use crate::lang::registry::{parse_source, parse_source_strict};
use crate::providers::SymbolIndex;

use self::fingerprint::assertion_fingerprint;
use self::imports::{imports_in, is_allowlisted, referenced_in_assertions, resolve_import};

/// Findings plus the candidates that could not be analyzed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedundancyOutcome {
    pub findings: Vec<RedundancyFinding>,
    pub parse_failures: Vec<ParseFailure>,
}

/// Existing test reduced to what the comparison needs.
struct CorpusEntry<'a> {
    test: &'a TestCase,
    fingerprint: Fingerprint,
    imports: BTreeSet<String>,
}

pub struct RedundancyDetector {
    check_redundant: bool,
    check_outdated: bool,
    extra_allowed: Vec<String>,
    symbols: Arc<dyn SymbolIndex>,
}

impl RedundancyDetector {
    pub fn new(config: &EngineConfig, symbols: Arc<dyn SymbolIndex>) -> Self {
        Self {
            check_redundant: config.check_redundant_tests,
            check_outdated: config.check_outdated_imports,
            extra_allowed: config.extra_allowed_modules.clone(),
            symbols,
        }
    }

    /// Compare candidates with the existing corpus and the symbol index.
    pub fn detect(&self, candidates: &[TestCase], existing: &[TestCase]) -> RedundancyOutcome {
        if !self.check_redundant && !self.check_outdated {
            return RedundancyOutcome::default();
        }

        let mut corpus: Vec<CorpusEntry<'_>> = if self.check_redundant {
            existing.par_iter().map(|test| self.corpus_entry(test)).collect()
        } else {
            Vec::new()
        };
        corpus.sort_by(|a, b| a.test.id.cmp(&b.test.id));

        let per_candidate: Vec<_> = candidates
            .par_iter()
            .map(|candidate| self.analyze_candidate(candidate, &corpus))
            .collect();

        let mut outcome = RedundancyOutcome::default();
        for result in per_candidate {
            match result {
                Ok(findings) => outcome.findings.extend(findings),
                Err(failure) => outcome.parse_failures.push(failure),
            }
        }
        outcome.findings.sort_by(|a, b| {
            (&a.test_id, a.kind, &a.matched_test_id, &a.missing_module).cmp(&(
                &b.test_id,
                b.kind,
                &b.matched_test_id,
                &b.missing_module,
            ))
        });
        outcome.parse_failures.sort_by(|a, b| a.test_id.cmp(&b.test_id));

        info!(
            "Redundancy check: {} findings, {} unparseable candidates",
            outcome.findings.len(),
            outcome.parse_failures.len()
        );
        outcome
    }

    fn corpus_entry<'a>(&self, test: &'a TestCase) -> CorpusEntry<'a> {
        let fingerprint = match &test.assertion_fingerprint {
            Some(fingerprint) if !fingerprint.is_empty() => fingerprint.clone(),
            _ => parse_source(test.language, &test.code)
                .map(|tree| assertion_fingerprint(&tree))
                .unwrap_or_default(),
        };
        let imports = self.functional_imports(test, &test.imported_modules);
        CorpusEntry {
            test,
            fingerprint,
            imports,
        }
    }

    fn analyze_candidate(
        &self,
        candidate: &TestCase,
        corpus: &[CorpusEntry<'_>],
    ) -> std::result::Result<Vec<RedundancyFinding>, ParseFailure> {
        let tree = parse_source_strict(candidate.language, &candidate.code).map_err(|e| {
            debug!("Candidate {} failed to parse: {}", candidate.id, e);
            ParseFailure {
                test_id: candidate.id.clone(),
                language: candidate.language,
                message: e.to_string(),
            }
        })?;

        let mut imports = candidate.imported_modules.clone();
        for (module, bindings) in imports_in(&tree) {
            imports.entry(module).or_default().extend(bindings);
        }

        let mut findings = Vec::new();
        if self.check_redundant {
            findings.extend(self.find_redundant(candidate, &tree, &imports, corpus));
        }
        if self.check_outdated {
            findings.extend(self.find_outdated(candidate, &tree, &imports));
        }
        Ok(findings)
    }

    fn find_redundant(
        &self,
        candidate: &TestCase,
        tree: &SyntaxNode,
        imports: &BTreeMap<String, BTreeSet<String>>,
        corpus: &[CorpusEntry<'_>],
    ) -> Option<RedundancyFinding> {
        let candidate_imports = self.functional_imports(candidate, imports);
        if candidate_imports.is_empty() {
            return None;
        }

        let mut fingerprint = assertion_fingerprint(tree);
        if fingerprint.is_empty() {
            fingerprint = candidate.assertion_fingerprint.clone().unwrap_or_default();
        }

        let overlaps = |entry: &CorpusEntry<'_>| !entry.imports.is_disjoint(&candidate_imports);
        let others = corpus.iter().filter(|entry| entry.test.id != candidate.id);

        if !fingerprint.is_empty() {
            let matched = others
                .clone()
                .find(|entry| fingerprint.is_subset(&entry.fingerprint) && overlaps(entry));
            if let Some(entry) = matched {
                let equal = fingerprint == entry.fingerprint;
                return Some(RedundancyFinding {
                    test_id: candidate.id.clone(),
                    kind: FindingKind::Redundant,
                    matched_test_id: Some(entry.test.id.clone()),
                    missing_module: None,
                    severity: if equal { Severity::Medium } else { Severity::Low },
                    reason: if equal {
                        format!("Asserts exactly what {} already asserts", entry.test.id)
                    } else {
                        format!("Assertions are a subset of {}", entry.test.id)
                    },
                });
            }
        }

        others
            .filter(|entry| entry.test.name == candidate.name && overlaps(entry))
            .map(|entry| RedundancyFinding {
                test_id: candidate.id.clone(),
                kind: FindingKind::Redundant,
                matched_test_id: Some(entry.test.id.clone()),
                missing_module: None,
                severity: Severity::Medium,
                reason: format!("A test named {} already exists", entry.test.name),
            })
            .next()
    }

    fn find_outdated(
        &self,
        candidate: &TestCase,
        tree: &SyntaxNode,
        imports: &BTreeMap<String, BTreeSet<String>>,
    ) -> Vec<RedundancyFinding> {
        let mut reported = BTreeSet::new();
        let mut findings = Vec::new();

        for (module, bindings) in imports {
            if is_allowlisted(module, candidate.language, &self.extra_allowed) {
                continue;
            }
            let resolved = resolve_import(module, &candidate.source_file, candidate.language);
            let exists = resolved
                .as_deref()
                .is_some_and(|path| self.symbols.module_exists(path));
            if exists {
                continue;
            }

            let missing = resolved.unwrap_or_else(|| module.clone());
            if !reported.insert(missing.clone()) {
                continue;
            }
            let in_assertion = referenced_in_assertions(tree, module, bindings);
            findings.push(RedundancyFinding {
                test_id: candidate.id.clone(),
                kind: FindingKind::OutdatedImport,
                matched_test_id: None,
                severity: if in_assertion { Severity::High } else { Severity::Medium },
                reason: if in_assertion {
                    format!("Asserts on {} which no longer exists", missing)
                } else {
                    format!("Imports {} which no longer exists", missing)
                },
                missing_module: Some(missing),
            });
        }
        findings
    }

    /// Resolved, non-allowlisted imports: the functional area of a test.
    fn functional_imports(
        &self,
        test: &TestCase,
        imports: &BTreeMap<String, BTreeSet<String>>,
    ) -> BTreeSet<String> {
        imports
            .keys()
            .filter(|module| !is_allowlisted(module, test.language, &self.extra_allowed))
            .filter_map(|module| resolve_import(module, &test.source_file, test.language))
            .map(|module| normalize_area(&module, test.language))
            .collect()
    }
}

/// Python `src.app.db` and `app.db` name the same area.
fn normalize_area(module: &str, language: Language) -> String {
    if language == Language::Python {
        for prefix in ["src.", "lib."] {
            if let Some(stripped) = module.strip_prefix(prefix) {
                return stripped.to_string();
            }
        }
    }
    module.to_string()
}

//! Quality report assembly and scoring.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::model::{
    CoverageDelta, CoverageGap, FindingKind, ModuleCoverage, ParseFailure, RedundancyFinding, SimilarityPair,
    StageName, Suggestion,
};

/// Score of a report with no findings.
pub const MAX_SCORE: f64 = 10.0;

/// Penalty per similar pair.
pub const SIMILAR_PAIR_PENALTY: f64 = 0.5;
/// Penalty per redundant test.
pub const REDUNDANT_PENALTY: f64 = 0.75;
/// Penalty per outdated import.
pub const OUTDATED_IMPORT_PENALTY: f64 = 1.0;
/// Penalty per AI suggestion. Only the count matters, never the content.
pub const SUGGESTION_PENALTY: f64 = 0.25;

/// Coarse label for a quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rating {
    #[serde(rename = "Needs Improvement")]
    NeedsImprovement,
    Fair,
    Good,
    Excellent,
}

impl Rating {
    pub fn from_score(score: f64) -> Self {
        if score >= 9.0 {
            Self::Excellent
        } else if score >= 7.0 {
            Self::Good
        } else if score >= 5.0 {
            Self::Fair
        } else {
            Self::NeedsImprovement
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::NeedsImprovement => "Needs Improvement",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub similarity_pairs: Vec<SimilarityPair>,
    pub redundancy_findings: Vec<RedundancyFinding>,
    /// Top gaps only; see `total_gap_count`
    pub coverage_gaps: Vec<CoverageGap>,
    pub total_gap_count: usize,
    /// `None` when the coverage stage did not complete
    pub coverage_delta: Option<CoverageDelta>,
    pub module_coverage: Vec<ModuleCoverage>,
    pub suggestions: Vec<Suggestion>,
    pub score: f64,
    pub rating: Rating,
    pub degraded_stages: BTreeSet<StageName>,
    pub parse_failures: Vec<ParseFailure>,
    pub warnings: Vec<String>,
    pub similarity_threshold: f64,
}

impl QualityReport {
    /// Redundancy findings of one kind.
    pub fn findings_of(&self, kind: FindingKind) -> impl Iterator<Item = &RedundancyFinding> {
        self.redundancy_findings.iter().filter(move |finding| finding.kind == kind)
    }

    /// Whether anything at all was flagged.
    pub fn has_issues(&self) -> bool {
        !(self.similarity_pairs.is_empty()
            && self.redundancy_findings.is_empty()
            && self.coverage_gaps.is_empty()
            && self.suggestions.is_empty())
    }

    pub fn is_degraded(&self, stage: StageName) -> bool {
        self.degraded_stages.contains(&stage)
    }
}

/// Deduct per-finding penalties from the maximum and clamp to [0, 10].
pub fn quality_score(pairs: usize, redundant: usize, outdated: usize, suggestions: usize) -> f64 {
    let penalty = SIMILAR_PAIR_PENALTY * pairs as f64
        + REDUNDANT_PENALTY * redundant as f64
        + OUTDATED_IMPORT_PENALTY * outdated as f64
        + SUGGESTION_PENALTY * suggestions as f64;
    (MAX_SCORE - penalty).clamp(0.0, MAX_SCORE)
}

/// Collects stage outputs and produces the final [`QualityReport`].
#[derive(Debug, Default)]
pub struct ReportBuilder {
    similarity_pairs: Vec<SimilarityPair>,
    redundancy_findings: Vec<RedundancyFinding>,
    coverage_gaps: Vec<CoverageGap>,
    total_gap_count: usize,
    coverage_delta: Option<CoverageDelta>,
    module_coverage: Vec<ModuleCoverage>,
    suggestions: Vec<Suggestion>,
    degraded_stages: BTreeSet<StageName>,
    parse_failures: Vec<ParseFailure>,
    warnings: Vec<String>,
    similarity_threshold: f64,
}

impl ReportBuilder {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
            ..Self::default()
        }
    }

    pub fn similarity_pairs(mut self, pairs: Vec<SimilarityPair>) -> Self {
        self.similarity_pairs = pairs;
        self
    }

    pub fn redundancy(mut self, findings: Vec<RedundancyFinding>, parse_failures: Vec<ParseFailure>) -> Self {
        self.redundancy_findings = findings;
        self.parse_failures = parse_failures;
        self
    }

    pub fn coverage(
        mut self,
        delta: CoverageDelta,
        module_coverage: Vec<ModuleCoverage>,
        gaps: Vec<CoverageGap>,
        total_gap_count: usize,
    ) -> Self {
        self.coverage_delta = Some(delta);
        self.module_coverage = module_coverage;
        self.coverage_gaps = gaps;
        self.total_gap_count = total_gap_count;
        self
    }

    pub fn suggestions(mut self, suggestions: Vec<Suggestion>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn degraded(mut self, stage: StageName) -> Self {
        self.degraded_stages.insert(stage);
        self
    }

    pub fn warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn build(self) -> QualityReport {
        let redundant = self
            .redundancy_findings
            .iter()
            .filter(|f| f.kind == FindingKind::Redundant)
            .count();
        let outdated = self.redundancy_findings.len() - redundant;
        let score = quality_score(self.similarity_pairs.len(), redundant, outdated, self.suggestions.len());

        QualityReport {
            similarity_pairs: self.similarity_pairs,
            redundancy_findings: self.redundancy_findings,
            coverage_gaps: self.coverage_gaps,
            total_gap_count: self.total_gap_count,
            coverage_delta: self.coverage_delta,
            module_coverage: self.module_coverage,
            suggestions: self.suggestions,
            score,
            rating: Rating::from_score(score),
            degraded_stages: self.degraded_stages,
            parse_failures: self.parse_failures,
            warnings: self.warnings,
            similarity_threshold: self.similarity_threshold,
        }
    }
}

//! Embedding similarity between candidate tests.
//!
//! All missing vectors are fetched in one batch, then every unordered pair is
//! scored with cosine similarity. Pairs at or above the threshold are kept
//! together with a template recommendation.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::core::errors::{Result, SuiteError};
use crate::core::model::{Language, SimilarityPair, TestCase};
use crate::providers::EmbeddingProvider;

/// Scores are rounded to this many decimal places.
const SCORE_DECIMALS: i32 = 6;

pub struct SimilarityAnalyzer {
    threshold: f64,
}

impl SimilarityAnalyzer {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Embed and compare the candidates.
    ///
    /// Fewer than two tests never reach the provider; tests that already
    /// carry a vector are not re-embedded.
    pub async fn analyze(
        &self,
        candidates: &[TestCase],
        provider: &dyn EmbeddingProvider,
    ) -> Result<Vec<SimilarityPair>> {
        if candidates.len() < 2 {
            return Ok(Vec::new());
        }

        let missing: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, test)| test.embedding_vector.is_none())
            .map(|(index, _)| index)
            .collect();

        let mut vectors: Vec<Option<Vec<f32>>> =
            candidates.iter().map(|t| t.embedding_vector.clone()).collect();

        if !missing.is_empty() {
            let texts: Vec<String> = missing.iter().map(|&i| candidates[i].embedding_text()).collect();
            debug!("Embedding {} tests with {}", texts.len(), provider.name());
            let fetched = provider.embed(&texts).await?;
            if fetched.len() != texts.len() {
                return Err(SuiteError::provider(
                    provider.name(),
                    format!("Expected {} vectors, received {}", texts.len(), fetched.len()),
                ));
            }
            for (index, vector) in missing.into_iter().zip(fetched) {
                vectors[index] = Some(vector);
            }
        }

        let vectors: Vec<Vec<f32>> = vectors.into_iter().flatten().collect();
        validate_vectors(provider.name(), &vectors)?;
        Ok(self.pairs_from_vectors(candidates, &vectors))
    }

    /// Score all pairs given one vector per candidate.
    pub fn pairs_from_vectors(&self, candidates: &[TestCase], vectors: &[Vec<f32>]) -> Vec<SimilarityPair> {
        let count = candidates.len().min(vectors.len());
        let mut pairs: Vec<SimilarityPair> = (0..count)
            .into_par_iter()
            .flat_map_iter(|i| {
                ((i + 1)..count).filter_map(move |j| {
                    let score = cosine_similarity(&vectors[i], &vectors[j]);
                    (score >= self.threshold).then(|| build_pair(&candidates[i], &candidates[j], score))
                })
            })
            .collect();

        pairs.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.test_id_a.cmp(&b.test_id_a))
                .then_with(|| a.test_id_b.cmp(&b.test_id_b))
        });
        info!("Found {} similar pairs at threshold {:.2}", pairs.len(), self.threshold);
        pairs
    }
}

fn validate_vectors(provider: &str, vectors: &[Vec<f32>]) -> Result<()> {
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    let dimension = first.len();
    if dimension == 0 {
        return Err(SuiteError::provider(provider, "Received zero-dimension vectors"));
    }
    for vector in vectors {
        if vector.len() != dimension {
            return Err(SuiteError::provider(
                provider,
                format!("Vector dimensions differ: {} vs {}", dimension, vector.len()),
            ));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(SuiteError::provider(provider, "Received non-finite vector values"));
        }
    }
    Ok(())
}

/// Cosine similarity clamped to [0, 1] and rounded.
///
/// Zero-norm vectors score 0. The value is symmetric in its arguments.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let raw = dot / (norm_a.sqrt() * norm_b.sqrt());
    let factor = 10f64.powi(SCORE_DECIMALS);
    ((raw.clamp(0.0, 1.0)) * factor).round() / factor
}

fn build_pair(first: &TestCase, second: &TestCase, score: f64) -> SimilarityPair {
    let (a, b) = if first.id <= second.id {
        (first, second)
    } else {
        (second, first)
    };

    let (recommendation, example_code) = if score >= 0.9 {
        ("Tests are nearly identical; remove the duplicate".to_string(), None)
    } else if score >= 0.8 {
        let recommendation = match a.language {
            Language::Python => "Combine using parametrization with @pytest.mark.parametrize",
            Language::JavaScript | Language::TypeScript => "Combine using parametrization with test.each",
        };
        (recommendation.to_string(), Some(parametrize_example(a, b)))
    } else {
        ("Consider consolidating or making the tests more distinct".to_string(), None)
    };

    SimilarityPair {
        test_id_a: a.id.clone(),
        test_id_b: b.id.clone(),
        score,
        recommendation,
        example_code,
    }
}

/// Shared prefix of two test names, without the `test_` marker.
fn common_base_name(a: &str, b: &str) -> String {
    let a = a.strip_prefix("test_").unwrap_or(a);
    let b = b.strip_prefix("test_").unwrap_or(b);
    let common: String = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .collect();
    let trimmed = common.trim_end_matches(['_', ' ', '-']);
    if trimmed.is_empty() {
        "combined".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parametrize_example(a: &TestCase, b: &TestCase) -> String {
    let base = common_base_name(&a.name, &b.name);
    match a.language {
        Language::Python => format!(
            "@pytest.mark.parametrize(\"case\", [\n    \"case_1\",  # from {}\n    \"case_2\",  # from {}\n])\ndef test_{}(case):\n    # shared test logic\n    ...",
            a.name, b.name, base
        ),
        Language::JavaScript | Language::TypeScript => format!(
            "test.each([\n  ['case_1'], // from {}\n  ['case_2'], // from {}\n])('{} %s', (testCase) => {{\n  // shared test logic\n}});",
            a.name, b.name, base
        ),
    }
}

#[cfg(test)]
mod tests;

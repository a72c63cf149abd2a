use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_relative_eq;
use async_trait::async_trait;

/// Returns canned vectors and counts batch calls.
struct FixedEmbedder {
    vectors: Vec<Vec<f32>>,
    calls: AtomicUsize,
}

impl FixedEmbedder {
    fn new(vectors: Vec<Vec<f32>>) -> Self {
        Self {
            vectors,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vectors.iter().take(texts.len()).cloned().collect())
    }
}

fn test_case(name: &str) -> TestCase {
    TestCase::new("tests/test_login.py", name, format!("def {}():\n    assert True\n", name), Language::Python)
}

#[test]
fn test_cosine_exact_values() {
    assert_relative_eq!(cosine_similarity(&[1.0, 0.0, 0.0, 0.0], &[7.0, 1.0, 5.0, 5.0]), 0.7);
    assert_relative_eq!(cosine_similarity(&[1.0, 0.0, 0.0, 0.0, 0.0], &[41.0, 28.0, 5.0, 3.0, 1.0]), 0.82);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
    assert_eq!(cosine_similarity(&[2.0, 2.0], &[3.0, 3.0]), 1.0);
}

#[test]
fn test_cosine_is_symmetric() {
    let a = [0.3, -1.2, 4.0];
    let b = [2.5, 0.1, 0.7];
    assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
}

#[tokio::test]
async fn test_threshold_is_inclusive_and_ordered() {
    let tests = vec![test_case("test_login_ok"), test_case("test_login_bad"), test_case("test_logout")];
    let embedder = FixedEmbedder::new(vec![
        vec![1.0, 0.0, 0.0, 0.0],
        vec![7.0, 1.0, 5.0, 5.0],
        vec![7.0, 1.0, 5.0, 5.0],
    ]);

    let pairs = SimilarityAnalyzer::new(0.7).analyze(&tests, &embedder).await.unwrap();

    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(pairs.len(), 3);
    assert_eq!(pairs[0].score, 1.0);
    assert_eq!(pairs[1].score, 0.7);
    assert_eq!(pairs[1].test_id_a, "tests/test_login.py::test_login_bad");
    assert_eq!(pairs[1].test_id_b, "tests/test_login.py::test_login_ok");
    assert_eq!(pairs[2].test_id_a, "tests/test_login.py::test_login_ok");
    assert!(pairs.iter().all(|p| p.test_id_a < p.test_id_b));
}

#[tokio::test]
async fn test_recommendation_bands() {
    let tests = vec![test_case("test_parse_int"), test_case("test_parse_float")];
    let embedder = FixedEmbedder::new(vec![vec![1.0, 0.0, 0.0, 0.0, 0.0], vec![41.0, 28.0, 5.0, 3.0, 1.0]]);
    let pairs = SimilarityAnalyzer::new(0.7).analyze(&tests, &embedder).await.unwrap();

    assert_eq!(pairs[0].score, 0.82);
    assert!(pairs[0].recommendation.contains("@pytest.mark.parametrize"));
    let example = pairs[0].example_code.as_deref().unwrap();
    assert!(example.contains("def test_parse("));

    let same = FixedEmbedder::new(vec![vec![1.0, 1.0], vec![1.0, 1.0]]);
    let pairs = SimilarityAnalyzer::new(0.7).analyze(&tests, &same).await.unwrap();
    assert!(pairs[0].recommendation.contains("nearly identical"));
}

#[tokio::test]
async fn test_js_pairs_suggest_test_each() {
    let tests = vec![
        TestCase::new("a.test.js", "adds numbers", "it('adds numbers', () => {})", Language::JavaScript),
        TestCase::new("a.test.js", "adds floats", "it('adds floats', () => {})", Language::JavaScript),
    ];
    let embedder = FixedEmbedder::new(vec![vec![1.0, 0.0, 0.0, 0.0, 0.0], vec![41.0, 28.0, 5.0, 3.0, 1.0]]);
    let pairs = SimilarityAnalyzer::new(0.7).analyze(&tests, &embedder).await.unwrap();
    assert!(pairs[0].recommendation.contains("test.each"));
    assert!(pairs[0].example_code.as_deref().unwrap().contains("'adds %s'"));
}

#[tokio::test]
async fn test_single_test_never_calls_provider() {
    let embedder = FixedEmbedder::new(vec![vec![1.0]]);
    let pairs = SimilarityAnalyzer::new(0.7)
        .analyze(&[test_case("test_only")], &embedder)
        .await
        .unwrap();
    assert!(pairs.is_empty());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_precomputed_vectors_skip_provider() {
    let tests = vec![
        test_case("test_a").with_embedding(vec![1.0, 0.0]),
        test_case("test_b").with_embedding(vec![1.0, 0.0]),
    ];
    let embedder = FixedEmbedder::new(Vec::new());
    let pairs = SimilarityAnalyzer::new(0.7).analyze(&tests, &embedder).await.unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_vectors_are_provider_errors() {
    let tests = vec![test_case("test_a"), test_case("test_b")];

    let short = FixedEmbedder::new(vec![vec![1.0, 0.0]]);
    let err = SimilarityAnalyzer::new(0.7).analyze(&tests, &short).await.unwrap_err();
    assert!(matches!(err, SuiteError::Provider { .. }));

    let ragged = FixedEmbedder::new(vec![vec![1.0, 0.0], vec![1.0]]);
    assert!(SimilarityAnalyzer::new(0.7).analyze(&tests, &ragged).await.is_err());

    let nan = FixedEmbedder::new(vec![vec![f32::NAN], vec![1.0]]);
    assert!(SimilarityAnalyzer::new(0.7).analyze(&tests, &nan).await.is_err());

    let empty = FixedEmbedder::new(vec![vec![], vec![]]);
    assert!(SimilarityAnalyzer::new(0.7).analyze(&tests, &empty).await.is_err());
}

#[test]
fn test_common_base_name() {
    assert_eq!(common_base_name("test_parse_int", "test_parse_float"), "parse");
    assert_eq!(common_base_name("test_alpha", "test_beta"), "combined");
}

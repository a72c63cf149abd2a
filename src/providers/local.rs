//! Offline embedding provider based on hashed code tokens.

use async_trait::async_trait;
use xxhash_rust::xxh3::xxh3_64;

use super::EmbeddingProvider;
use crate::core::errors::Result;

/// Default vector width.
pub const LOCAL_DIMENSIONS: usize = 256;

/// Deterministic bag-of-tokens embedder.
///
/// Identifiers and numbers are hashed into a fixed number of buckets and the
/// resulting vector is L2-normalized, so textually close tests end up close
/// in cosine space without any network access.
#[derive(Debug, Clone)]
pub struct LocalEmbeddingProvider {
    dimensions: usize,
}

impl Default for LocalEmbeddingProvider {
    fn default() -> Self {
        Self::new(LOCAL_DIMENSIONS)
    }
}

impl LocalEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed one text synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            let hash = xxh3_64(token.as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            // high bit picks the sign so unrelated tokens tend to cancel
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        } else {
            // empty input still needs a non-zero vector
            vector[0] = 1.0;
        }
        vector
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

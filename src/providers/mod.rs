//! External collaborators consumed by the engine.
//!
//! Each collaborator sits behind a trait so the engine can be driven by real
//! HTTP clients, local fallbacks, or test fakes.

pub mod local;
pub mod openai;
pub mod symbols;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::core::errors::{Result, SuiteError};
use crate::core::model::Suggestion;

pub use local::LocalEmbeddingProvider;
pub use openai::{OpenAiClient, OpenAiConfig};
pub use symbols::{StaticSymbolIndex, SymbolIndex, WorkspaceSymbolIndex};

/// Batch embedding provider.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Embed every text; the result has one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Advisory suggestion provider.
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Suggest optimizations for the given test code.
    async fn suggest(&self, tests_code: &str, context: &str) -> Result<Vec<Suggestion>>;
}

/// Run `call` with a per-attempt timeout, retrying transient failures.
///
/// `max_retries` is the number of additional attempts after the first one.
pub async fn call_with_retry<T, F, Fut>(
    operation: &str,
    timeout: Duration,
    max_retries: u32,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        let outcome = match tokio::time::timeout(timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(SuiteError::timeout(operation, timeout)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_retries => {
                attempt += 1;
                warn!("{} failed ({}), retrying ({}/{})", operation, err, attempt, max_retries);
            }
            Err(err) => return Err(err),
        }
    }
}

//! Configuration for the quality engine.
//!
//! One [`EngineConfig`] is built per invocation, validated once, and then
//! shared read-only by every stage.

pub mod validation;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SuiteError};

pub use validation::{
    validate_bounded_usize, validate_non_negative_f32, validate_positive_u32,
    validate_positive_u64, validate_positive_usize, validate_unit_range,
};

/// Main configuration for a suite quality analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum cosine similarity for two tests to be reported as a pair (inclusive)
    #[serde(default = "EngineConfig::default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Run the embedding-based similarity stage
    #[serde(default = "EngineConfig::default_true")]
    pub use_embeddings: bool,

    /// Ask the suggestion provider for optimization advice
    #[serde(default = "EngineConfig::default_true")]
    pub enable_ai_suggestions: bool,

    /// Compare candidate assertion fingerprints against the existing corpus
    #[serde(default = "EngineConfig::default_true")]
    pub check_redundant_tests: bool,

    /// Check candidate imports against the symbol index
    #[serde(default = "EngineConfig::default_true")]
    pub check_outdated_imports: bool,

    /// Time budget for each coverage tool invocation
    #[serde(default = "EngineConfig::default_coverage_timeout_seconds")]
    pub coverage_timeout_seconds: u64,

    /// Report uncovered ranges in addition to the coverage delta
    #[serde(default = "EngineConfig::default_true")]
    pub include_gaps: bool,

    /// Number of prioritized gaps carried in the report
    #[serde(default = "EngineConfig::default_top_gap_count")]
    pub top_gap_count: usize,

    /// Overall deadline for the whole analysis; `None` disables it
    #[serde(default = "EngineConfig::default_analysis_deadline_seconds")]
    pub analysis_deadline_seconds: Option<u64>,

    /// Run baseline and candidate coverage concurrently in separate workspace copies
    #[serde(default)]
    pub isolated_coverage_runs: bool,

    /// Module roots treated as always available, on top of the built-in allowlists
    #[serde(default)]
    pub extra_allowed_modules: Vec<String>,

    /// External provider settings
    #[serde(default)]
    pub provider: ProviderConfig,
}

/// Default implementation for [`EngineConfig`].
impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: Self::default_similarity_threshold(),
            use_embeddings: true,
            enable_ai_suggestions: true,
            check_redundant_tests: true,
            check_outdated_imports: true,
            coverage_timeout_seconds: Self::default_coverage_timeout_seconds(),
            include_gaps: true,
            top_gap_count: Self::default_top_gap_count(),
            analysis_deadline_seconds: Self::default_analysis_deadline_seconds(),
            isolated_coverage_runs: false,
            extra_allowed_modules: Vec::new(),
            provider: ProviderConfig::default(),
        }
    }
}

impl EngineConfig {
    const fn default_similarity_threshold() -> f64 {
        0.70
    }

    const fn default_true() -> bool {
        true
    }

    const fn default_coverage_timeout_seconds() -> u64 {
        300
    }

    const fn default_top_gap_count() -> usize {
        5
    }

    #[allow(clippy::unnecessary_wraps)]
    const fn default_analysis_deadline_seconds() -> Option<u64> {
        Some(900)
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            SuiteError::io(format!("Failed to read config file: {}", path.display()), e)
        })?;

        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn to_yaml_file(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content).map_err(|e| {
            SuiteError::io(
                format!("Failed to write config file: {}", path.display()),
                e,
            )
        })
    }

    /// Validate every section of the configuration
    pub fn validate(&self) -> Result<()> {
        if self.similarity_threshold.is_nan() {
            return Err(SuiteError::validation_field(
                "similarity_threshold must be a number",
                "similarity_threshold",
            ));
        }
        validate_unit_range(self.similarity_threshold, "similarity_threshold")?;
        validate_positive_u64(self.coverage_timeout_seconds, "coverage_timeout_seconds")?;
        validate_bounded_usize(self.top_gap_count, 1, 100, "top_gap_count")?;
        if let Some(deadline) = self.analysis_deadline_seconds {
            validate_positive_u64(deadline, "analysis_deadline_seconds")?;
        }
        if self.extra_allowed_modules.iter().any(|m| m.trim().is_empty()) {
            return Err(SuiteError::validation_field(
                "extra_allowed_modules entries must not be empty",
                "extra_allowed_modules",
            ));
        }
        self.provider.validate()
    }

    /// Per-invocation budget for a coverage tool run.
    pub fn coverage_timeout(&self) -> Duration {
        Duration::from_secs(self.coverage_timeout_seconds)
    }

    /// Overall analysis deadline, if one is configured.
    pub fn analysis_deadline(&self) -> Option<Duration> {
        self.analysis_deadline_seconds.map(Duration::from_secs)
    }

    /// Set the similarity threshold
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set the number of gaps carried in the report
    pub fn with_top_gap_count(mut self, count: usize) -> Self {
        self.top_gap_count = count;
        self
    }

    /// Set the overall analysis deadline
    pub fn with_analysis_deadline(mut self, seconds: Option<u64>) -> Self {
        self.analysis_deadline_seconds = seconds;
        self
    }
}

/// Settings for the OpenAI-compatible embedding and chat endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API base URL, overridable with `OPENAI_BASE_URL`
    #[serde(default = "ProviderConfig::default_base_url")]
    pub base_url: String,

    /// Embedding model name
    #[serde(default = "ProviderConfig::default_embedding_model")]
    pub embedding_model: String,

    /// Chat model used for suggestions
    #[serde(default = "ProviderConfig::default_chat_model")]
    pub chat_model: String,

    /// Timeout for each provider request
    #[serde(default = "ProviderConfig::default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Retries after a transient failure
    #[serde(default = "ProviderConfig::default_max_retries")]
    pub max_retries: u32,

    /// Sampling temperature for suggestions
    #[serde(default = "ProviderConfig::default_temperature")]
    pub temperature: f32,

    /// Completion token cap for suggestions
    #[serde(default = "ProviderConfig::default_max_tokens")]
    pub max_tokens: u32,
}

/// Default implementation for [`ProviderConfig`].
impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            embedding_model: Self::default_embedding_model(),
            chat_model: Self::default_chat_model(),
            request_timeout_seconds: Self::default_request_timeout_seconds(),
            max_retries: Self::default_max_retries(),
            temperature: Self::default_temperature(),
            max_tokens: Self::default_max_tokens(),
        }
    }
}

impl ProviderConfig {
    fn default_base_url() -> String {
        "https://api.openai.com/v1".to_string()
    }

    fn default_embedding_model() -> String {
        "text-embedding-ada-002".to_string()
    }

    fn default_chat_model() -> String {
        "gpt-4o-mini".to_string()
    }

    const fn default_request_timeout_seconds() -> u64 {
        60
    }

    const fn default_max_retries() -> u32 {
        1
    }

    const fn default_temperature() -> f32 {
        0.3
    }

    const fn default_max_tokens() -> u32 {
        2000
    }

    /// Validate provider settings
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(SuiteError::validation_field(
                "provider.base_url must not be empty",
                "provider.base_url",
            ));
        }
        validate_positive_u64(self.request_timeout_seconds, "provider.request_timeout_seconds")?;
        validate_positive_u32(self.max_tokens, "provider.max_tokens")?;
        validate_non_negative_f32(self.temperature, "provider.temperature")?;
        if self.max_retries > 5 {
            return Err(SuiteError::validation_field(
                "provider.max_retries must be at most 5",
                "provider.max_retries",
            ));
        }
        Ok(())
    }

    /// Timeout applied to each provider request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Upper bound for one provider call including its retries.
    pub fn call_budget(&self) -> Duration {
        self.request_timeout() * (self.max_retries + 1)
    }
}

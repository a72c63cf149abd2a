//! Error types for the suitecheck library.
//!
//! Stage-level errors are caught by the engine and turned into degraded stage
//! markers; only precondition violations reach the caller of
//! [`crate::QualityEngine::analyze`].

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main result type for suitecheck operations.
pub type Result<T> = std::result::Result<T, SuiteError>;

/// Error type for all suitecheck operations.
#[derive(Error, Debug)]
pub enum SuiteError {
    /// I/O related errors (file operations, process spawning)
    #[error("I/O error: {message}")]
    Io {
        /// Human-readable error message
        message: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        /// Error description
        message: String,
    },

    /// Malformed test or source syntax
    #[error("Parse error in {language}: {message}")]
    Parse {
        /// Language being parsed
        language: String,
        /// Error description
        message: String,
        /// File path where error occurred
        file_path: Option<String>,
        /// Line number (if available)
        line: Option<usize>,
    },

    /// Embedding or suggestion provider unreachable or returned malformed output
    #[error("Provider error from {provider}: {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error description
        message: String,
        /// Whether a retry may succeed
        transient: bool,
    },

    /// An external call exceeded its time budget
    #[error("Timed out after {}s: {operation}", .elapsed.as_secs_f64())]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Budget that was exceeded
        elapsed: Duration,
    },

    /// Coverage tooling is not installed in the target environment
    #[error("Required tool '{tool}' is not available: {hint}")]
    ToolMissing {
        /// Missing executable or plugin
        tool: String,
        /// How to install or enable it
        hint: String,
    },

    /// Coverage report missing or unreadable
    #[error("Coverage error: {message}")]
    Coverage {
        /// Error description
        message: String,
        /// Report path involved
        report_path: Option<String>,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error description
        message: String,
        /// Data type being serialized
        data_type: Option<String>,
        /// Underlying serialization error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors for input data
    #[error("Validation error: {message}")]
    Validation {
        /// Error description
        message: String,
        /// Field or input that failed validation
        field: Option<String>,
    },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal {
        /// Error description
        message: String,
        /// Additional context
        context: Option<String>,
    },
}

impl SuiteError {
    /// Create a new I/O error with context
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse(language: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            language: language.into(),
            message: message.into(),
            file_path: None,
            line: None,
        }
    }

    /// Create a provider error that a retry may fix
    pub fn provider_transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            transient: true,
        }
    }

    /// Create a provider error that will not go away on retry
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            transient: false,
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }

    /// Create a missing-tool error
    pub fn tool_missing(tool: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::ToolMissing {
            tool: tool.into(),
            hint: hint.into(),
        }
    }

    /// Create a coverage report error
    pub fn coverage(message: impl Into<String>) -> Self {
        Self::Coverage {
            message: message.into(),
            report_path: None,
        }
    }

    /// Create a coverage report error tied to a report file
    pub fn coverage_report(message: impl Into<String>, report_path: impl Into<String>) -> Self {
        Self::Coverage {
            message: message.into(),
            report_path: Some(report_path.into()),
        }
    }

    /// Create a new validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new validation error naming the offending field
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            context: None,
        }
    }

    /// Whether retrying the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider { transient, .. } => *transient,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Add context to an existing error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        match &mut self {
            Self::Internal { context: ctx, .. } => {
                *ctx = Some(context);
            }
            Self::Io { message, .. }
            | Self::Coverage { message, .. }
            | Self::Provider { message, .. } => {
                *message = format!("{context}: {message}");
            }
            _ => {}
        }
        self
    }
}

impl From<io::Error> for SuiteError {
    fn from(err: io::Error) -> Self {
        Self::io("I/O operation failed", err)
    }
}

impl From<serde_json::Error> for SuiteError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: format!("JSON serialization failed: {err}"),
            data_type: Some("JSON".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_yaml::Error> for SuiteError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: format!("YAML serialization failed: {err}"),
            data_type: Some("YAML".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<toml::de::Error> for SuiteError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            message: format!("TOML parsing failed: {err}"),
            data_type: Some("TOML".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<quick_xml::Error> for SuiteError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Serialization {
            message: format!("XML parsing failed: {err}"),
            data_type: Some("XML".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<reqwest::Error> for SuiteError {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_timeout() || err.is_connect() || err.is_request();
        Self::Provider {
            provider: "http".to_string(),
            message: err.to_string(),
            transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SuiteError::provider_transient("openai", "503").is_transient());
        assert!(!SuiteError::provider("openai", "401").is_transient());
        assert!(SuiteError::timeout("embed", Duration::from_secs(5)).is_transient());
        assert!(!SuiteError::tool_missing("pytest", "pip install pytest-cov").is_transient());
    }

    #[test]
    fn test_timeout_display() {
        let err = SuiteError::timeout("coverage run", Duration::from_secs(300));
        assert_eq!(err.to_string(), "Timed out after 300s: coverage run");
    }

    #[test]
    fn test_with_context_prefixes_message() {
        let err = SuiteError::coverage("report not produced").with_context("baseline");
        if let SuiteError::Coverage { message, .. } = err {
            assert_eq!(message, "baseline: report not produced");
        } else {
            panic!("Expected Coverage error");
        }
    }

    #[test]
    fn test_from_toml_error() {
        let toml_err = "[project\nname = ".parse::<toml::Table>().unwrap_err();
        let err: SuiteError = toml_err.into();
        assert!(err.to_string().starts_with("Serialization error: TOML parsing failed"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: SuiteError = json_err.into();
        assert!(matches!(err, SuiteError::Serialization { .. }));
    }
}

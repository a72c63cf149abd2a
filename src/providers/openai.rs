//! OpenAI-compatible HTTP client for embeddings and chat suggestions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{call_with_retry, EmbeddingProvider, SuggestionProvider};
use crate::core::config::ProviderConfig;
use crate::core::errors::{Result, SuiteError};
use crate::core::model::Suggestion;

const PROVIDER_NAME: &str = "openai";

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub settings: ProviderConfig,
}

impl OpenAiConfig {
    /// Build from `OPENAI_API_KEY` and an optional `OPENAI_BASE_URL`.
    pub fn from_env(settings: ProviderConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| SuiteError::config("OPENAI_API_KEY environment variable not set"))?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| settings.base_url.clone());

        Ok(Self {
            api_key,
            base_url,
            settings,
        })
    }

    pub fn new(api_key: impl Into<String>, settings: ProviderConfig) -> Self {
        let base_url = settings.base_url.clone();
        Self {
            api_key: api_key.into(),
            base_url,
            settings,
        }
    }

    /// Point the client at a different endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Client implementing both provider traits against one endpoint.
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.config.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = format!("{} returned {}: {}", path, status, error_text);
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                SuiteError::provider_transient(PROVIDER_NAME, message)
            } else {
                SuiteError::provider(PROVIDER_NAME, message)
            });
        }

        response
            .json()
            .await
            .map_err(|e| SuiteError::provider(PROVIDER_NAME, format!("Malformed {} response: {}", path, e)))
    }

    async fn embed_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.config.settings.embedding_model,
            input: texts,
        };
        let response: EmbeddingResponse = self.post_json("embeddings", &request).await?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    async fn chat_once(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.settings.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.config.settings.temperature,
            max_tokens: self.config.settings.max_tokens,
        };
        let response: ChatResponse = self.post_json("chat/completions", &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| SuiteError::provider(PROVIDER_NAME, "No choices in chat response"))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Requesting {} embeddings", texts.len());
        let settings = &self.config.settings;
        call_with_retry("embedding request", settings.request_timeout(), settings.max_retries, || {
            self.embed_once(texts)
        })
        .await
    }
}

#[async_trait]
impl SuggestionProvider for OpenAiClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn suggest(&self, tests_code: &str, context: &str) -> Result<Vec<Suggestion>> {
        let prompt = build_prompt(tests_code, context);
        let settings = &self.config.settings;
        let text = call_with_retry("suggestion request", settings.request_timeout(), settings.max_retries, || {
            self.chat_once(&prompt)
        })
        .await?;

        let suggestions = parse_suggestions(&text);
        info!("Received {} suggestions", suggestions.len());
        Ok(suggestions)
    }
}

const SYSTEM_PROMPT: &str = "You are an expert test automation engineer reviewing test code quality.

Identify optimization opportunities in the provided tests. Focus on:
- parameterization: tests with the same logic and different inputs
- fixture: repeated setup that belongs in a fixture
- assertion: weak or missing assertions
- code_smell: hard-coded values, poor naming, antipatterns
- edge_case: important scenarios that are not covered

Respond ONLY with JSON of the form:
{\"suggestions\": [{\"type\": \"parameterization\", \"tests\": [\"test_a\"], \"reason\": \"...\", \"suggestion\": \"...\", \"code_example\": \"...\"}]}

Limit the answer to the five most important suggestions.";

/// User prompt sent with the concatenated test code.
pub fn build_prompt(tests_code: &str, context: &str) -> String {
    let mut prompt = String::from("Analyze these test cases for optimization opportunities.\n\n");
    if !context.trim().is_empty() {
        prompt.push_str("Context:\n");
        prompt.push_str(context.trim());
        prompt.push_str("\n\n");
    }
    prompt.push_str("=== TEST CASES ===\n\n");
    prompt.push_str(tests_code);
    prompt.push_str("\n\nProvide optimization suggestions as JSON.");
    prompt
}

#[derive(Debug, Deserialize)]
struct SuggestionEnvelope {
    #[serde(default)]
    suggestions: Vec<RawSuggestion>,
}

#[derive(Debug, Deserialize)]
struct RawSuggestion {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    tests: Vec<String>,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    suggestion: String,
    #[serde(default)]
    code_example: Option<String>,
}

/// Parse a chat reply into suggestions.
///
/// The JSON object between the first `{` and the last `}` is decoded; when
/// that fails the reply is scanned for keywords instead.
pub fn parse_suggestions(text: &str) -> Vec<Suggestion> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return fallback_suggestions(text);
    };
    if end <= start {
        return fallback_suggestions(text);
    }

    match serde_json::from_str::<SuggestionEnvelope>(&text[start..=end]) {
        Ok(envelope) => envelope
            .suggestions
            .into_iter()
            .map(|raw| Suggestion {
                category: raw.kind.unwrap_or_else(|| "general".to_string()),
                title: raw.title.filter(|t| !t.trim().is_empty()).unwrap_or(raw.suggestion),
                rationale: raw.reason,
                affected_tests: raw.tests,
                code_example: raw.code_example.filter(|code| !code.trim().is_empty()),
            })
            .collect(),
        Err(e) => {
            warn!("Suggestion reply is not valid JSON: {}", e);
            fallback_suggestions(text)
        }
    }
}

fn fallback_suggestions(text: &str) -> Vec<Suggestion> {
    let lower = text.to_lowercase();
    let mut suggestions = Vec::new();

    if lower.contains("parametrize") || lower.contains("parameter") {
        suggestions.push(Suggestion {
            category: "parameterization".to_string(),
            title: "Consider parametrizing similar tests".to_string(),
            rationale: "Tests have similar logic with different inputs".to_string(),
            affected_tests: Vec::new(),
            code_example: None,
        });
    }
    if lower.contains("fixture") {
        suggestions.push(Suggestion {
            category: "fixture".to_string(),
            title: "Extract repeated setup to a fixture".to_string(),
            rationale: "Common setup code detected".to_string(),
            affected_tests: Vec::new(),
            code_example: None,
        });
    }
    if lower.contains("assertion") {
        suggestions.push(Suggestion {
            category: "assertion".to_string(),
            title: "Strengthen the assertions".to_string(),
            rationale: "Some tests assert too little about the result".to_string(),
            affected_tests: Vec::new(),
            code_example: None,
        });
    }
    if lower.contains("edge case") {
        suggestions.push(Suggestion {
            category: "edge_case".to_string(),
            title: "Cover the missing edge cases".to_string(),
            rationale: "Boundary inputs are not exercised".to_string(),
            affected_tests: Vec::new(),
            code_example: None,
        });
    }
    suggestions
}

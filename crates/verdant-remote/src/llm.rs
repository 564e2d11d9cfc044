//! LLM backend abstraction and implementations.
//!
//! Defines an enum-based dispatch for LLM backends, avoiding the
//! dyn-compatibility issues with async trait methods. Concrete
//! implementations exist for OpenAI-compatible APIs, the Anthropic
//! Messages API, and Google Gemini `generateContent`. All backends
//! communicate over HTTP via `reqwest`.

use std::time::Duration;

use verdant_core::config::{FeedbackBackend, FeedbackConfig};

use crate::error::RemoteError;
use crate::prompt::RenderedPrompt;

/// Token budget for one suggestion.
const MAX_TOKENS: u32 = 256;

/// Connection settings shared by every backend.
#[derive(Clone)]
pub struct LlmBackendConfig {
    /// Base API URL without a trailing slash.
    pub api_url: String,
    /// API key.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl LlmBackendConfig {
    /// Settings from the feedback section plus a resolved key.
    pub fn from_feedback(config: &FeedbackConfig, api_key: String) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            api_key,
            model: config.model.clone(),
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    fn client(&self) -> Result<reqwest::Client, RemoteError> {
        Ok(reqwest::Client::builder().timeout(self.timeout).build()?)
    }
}

// ---------------------------------------------------------------------------
// Unified backend enum (dyn-compatible alternative to async trait)
// ---------------------------------------------------------------------------

/// An LLM backend that can process a prompt and return a response.
pub enum LlmBackend {
    /// OpenAI-compatible chat completions API.
    OpenAi(OpenAiBackend),
    /// Anthropic Messages API.
    Anthropic(AnthropicBackend),
    /// Google Gemini `generateContent` API.
    Gemini(GeminiBackend),
}

impl LlmBackend {
    /// Send a prompt to the LLM and return the response text.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::LlmBackend`] if the HTTP call fails or the
    /// response cannot be extracted.
    pub async fn complete(&self, prompt: &RenderedPrompt) -> Result<String, RemoteError> {
        match self {
            Self::OpenAi(backend) => backend.complete(prompt).await,
            Self::Anthropic(backend) => backend.complete(prompt).await,
            Self::Gemini(backend) => backend.complete(prompt).await,
        }
    }

    /// Human-readable name for logging.
    pub const fn name(&self) -> &str {
        match self {
            Self::OpenAi(_) => "openai-compatible",
            Self::Anthropic(_) => "anthropic",
            Self::Gemini(_) => "gemini",
        }
    }
}

/// POST `body` and return the decoded JSON, turning non-success statuses
/// into [`RemoteError::LlmBackend`].
async fn post_json(
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
    label: &str,
) -> Result<serde_json::Value, RemoteError> {
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| RemoteError::LlmBackend(format!("{label} request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("unable to read error body: {e}"));
        return Err(RemoteError::LlmBackend(format!(
            "{label} returned {status}: {error_body}"
        )));
    }

    response
        .json()
        .await
        .map_err(|e| RemoteError::LlmBackend(format!("{label} response parse failed: {e}")))
}

// ---------------------------------------------------------------------------
// OpenAI-compatible backend
// ---------------------------------------------------------------------------

/// Backend for OpenAI-compatible chat completions APIs.
///
/// Works with `OpenAI`, `DeepSeek`, and Ollama endpoints.
/// Sends requests to `{api_url}/chat/completions`.
pub struct OpenAiBackend {
    client: reqwest::Client,
    config: LlmBackendConfig,
}

impl OpenAiBackend {
    /// Create a new `OpenAI`-compatible backend.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Client`] if the HTTP client cannot be built.
    pub fn new(config: LlmBackendConfig) -> Result<Self, RemoteError> {
        Ok(Self {
            client: config.client()?,
            config,
        })
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String, RemoteError> {
        let url = format!("{}/chat/completions", self.config.api_url);
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user}
            ],
            "temperature": 0.4,
            "max_tokens": MAX_TOKENS
        });
        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key));

        let json = post_json(request, &body, "OpenAI").await?;
        extract_openai_content(&json)
    }
}

/// Extract the text content from an `OpenAI` chat completions response.
fn extract_openai_content(json: &serde_json::Value) -> Result<String, RemoteError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            RemoteError::LlmBackend("OpenAI response missing choices[0].message.content".to_owned())
        })
}

// ---------------------------------------------------------------------------
// Anthropic Messages API backend
// ---------------------------------------------------------------------------

/// Backend for the Anthropic Messages API.
///
/// Uses the `x-api-key` header, a top-level `system` field, and returns
/// text at `content[0].text`.
pub struct AnthropicBackend {
    client: reqwest::Client,
    config: LlmBackendConfig,
}

impl AnthropicBackend {
    /// Create a new Anthropic Messages API backend.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Client`] if the HTTP client cannot be built.
    pub fn new(config: LlmBackendConfig) -> Result<Self, RemoteError> {
        Ok(Self {
            client: config.client()?,
            config,
        })
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String, RemoteError> {
        let url = format!("{}/messages", self.config.api_url);
        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": MAX_TOKENS,
            "system": prompt.system,
            "messages": [
                {"role": "user", "content": prompt.user}
            ]
        });
        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01");

        let json = post_json(request, &body, "Anthropic").await?;
        extract_anthropic_content(&json)
    }
}

/// Extract the text content from an Anthropic Messages API response.
fn extract_anthropic_content(json: &serde_json::Value) -> Result<String, RemoteError> {
    json.get("content")
        .and_then(|c| c.get(0))
        .and_then(|b| b.get("text"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            RemoteError::LlmBackend("Anthropic response missing content[0].text".to_owned())
        })
}

// ---------------------------------------------------------------------------
// Gemini backend
// ---------------------------------------------------------------------------

/// Backend for Google Gemini `generateContent`.
///
/// Sends to `{api_url}/models/{model}:generateContent?key={api_key}`; the
/// system message travels as `systemInstruction`.
pub struct GeminiBackend {
    client: reqwest::Client,
    config: LlmBackendConfig,
}

impl GeminiBackend {
    /// Create a new Gemini backend.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Client`] if the HTTP client cannot be built.
    pub fn new(config: LlmBackendConfig) -> Result<Self, RemoteError> {
        Ok(Self {
            client: config.client()?,
            config,
        })
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String, RemoteError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_url, self.config.model
        );
        let body = serde_json::json!({
            "systemInstruction": {"parts": [{"text": prompt.system}]},
            "contents": [
                {"role": "user", "parts": [{"text": prompt.user}]}
            ],
            "generationConfig": {"maxOutputTokens": MAX_TOKENS}
        });
        let request = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())]);

        let json = post_json(request, &body, "Gemini").await?;
        extract_gemini_content(&json)
    }
}

/// Extract the text from a Gemini `generateContent` response.
fn extract_gemini_content(json: &serde_json::Value) -> Result<String, RemoteError> {
    json.get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            RemoteError::LlmBackend(
                "Gemini response missing candidates[0].content.parts[0].text".to_owned(),
            )
        })
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Create an LLM backend for the configured backend kind.
///
/// # Errors
///
/// Returns [`RemoteError::Config`] for [`FeedbackBackend::Canned`], which
/// is not an LLM, and [`RemoteError::Client`] if the HTTP client cannot be
/// built.
pub fn create_backend(
    kind: FeedbackBackend,
    config: LlmBackendConfig,
) -> Result<LlmBackend, RemoteError> {
    match kind {
        FeedbackBackend::Openai => Ok(LlmBackend::OpenAi(OpenAiBackend::new(config)?)),
        FeedbackBackend::Anthropic => Ok(LlmBackend::Anthropic(AnthropicBackend::new(config)?)),
        FeedbackBackend::Gemini => Ok(LlmBackend::Gemini(GeminiBackend::new(config)?)),
        FeedbackBackend::Canned => Err(RemoteError::Config(
            "the canned feedback backend has no LLM".to_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LlmBackendConfig {
        LlmBackendConfig {
            api_url: "https://example.invalid/v1".to_owned(),
            api_key: "test".to_owned(),
            model: "test-model".to_owned(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn extract_openai_content_valid() {
        let json = serde_json::json!({
            "choices": [{"message": {"content": "Split the handler into smaller functions."}}]
        });
        let result = extract_openai_content(&json);
        assert!(result.unwrap_or_default().contains("smaller functions"));
    }

    #[test]
    fn extract_openai_content_missing_choices() {
        let json = serde_json::json!({"error": "rate_limit"});
        assert!(extract_openai_content(&json).is_err());
    }

    #[test]
    fn extract_anthropic_content_valid() {
        let json = serde_json::json!({
            "content": [{"type": "text", "text": "Add a regression test."}]
        });
        assert_eq!(
            extract_anthropic_content(&json).unwrap_or_default(),
            "Add a regression test."
        );
    }

    #[test]
    fn extract_anthropic_content_missing() {
        let json = serde_json::json!({"content": []});
        assert!(extract_anthropic_content(&json).is_err());
    }

    #[test]
    fn extract_gemini_content_valid() {
        let json = serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "Name the magic number."}], "role": "model"}
            }]
        });
        assert_eq!(
            extract_gemini_content(&json).unwrap_or_default(),
            "Name the magic number."
        );
    }

    #[test]
    fn extract_gemini_content_missing() {
        let json = serde_json::json!({"candidates": []});
        assert!(extract_gemini_content(&json).is_err());
    }

    #[test]
    fn create_backend_dispatches_correctly() {
        let names: Vec<_> = [
            FeedbackBackend::Openai,
            FeedbackBackend::Anthropic,
            FeedbackBackend::Gemini,
        ]
        .into_iter()
        .filter_map(|kind| create_backend(kind, config()).ok())
        .map(|backend| backend.name().to_owned())
        .collect();
        assert_eq!(names, ["openai-compatible", "anthropic", "gemini"]);

        assert!(matches!(
            create_backend(FeedbackBackend::Canned, config()),
            Err(RemoteError::Config(_))
        ));
    }
}

//! LLM-backed feedback generation.
//!
//! [`AnyFeedbackGenerator`] is what the engine hands to the cycle driver:
//! either an LLM behind a prompt template, or the offline canned generator.

use verdant_core::config::{FeedbackBackend, FeedbackConfig};
use verdant_core::feedback::{CannedFeedbackGenerator, FeedbackGenerator, GenerationError};

use crate::error::RemoteError;
use crate::llm::{LlmBackend, LlmBackendConfig, create_backend};
use crate::prompt::PromptTemplate;

/// Renders the prompt for an event and asks an LLM for a suggestion.
pub struct LlmFeedbackGenerator {
    backend: LlmBackend,
    prompt: PromptTemplate,
}

impl LlmFeedbackGenerator {
    /// Combine a backend and a prompt template.
    pub const fn new(backend: LlmBackend, prompt: PromptTemplate) -> Self {
        Self { backend, prompt }
    }

    /// Name of the underlying backend.
    pub const fn backend_name(&self) -> &str {
        self.backend.name()
    }
}

impl FeedbackGenerator for LlmFeedbackGenerator {
    async fn describe(&self, event_description: &str) -> Result<String, GenerationError> {
        let prompt = self.prompt.render(event_description)?;
        let raw = self.backend.complete(&prompt).await?;
        clean_suggestion(&raw)
    }
}

/// Trim a raw completion, rejecting one with no text.
fn clean_suggestion(raw: &str) -> Result<String, GenerationError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(text.to_owned())
}

/// The configured feedback generator.
pub enum AnyFeedbackGenerator {
    /// An LLM behind a prompt template.
    Llm(Box<LlmFeedbackGenerator>),
    /// Fixed offline suggestion.
    Canned(CannedFeedbackGenerator),
}

impl AnyFeedbackGenerator {
    /// Build the generator described by `config`, reading the API key from
    /// the environment variable it names.
    ///
    /// Returns `Ok(None)` when feedback is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Config`] if an LLM backend is selected and
    /// its key variable is unset, or any error from building the template
    /// or HTTP client.
    pub fn from_config(config: &FeedbackConfig) -> Result<Option<Self>, RemoteError> {
        let api_key = std::env::var(&config.api_key_env).ok();
        Self::build(config, api_key)
    }

    fn build(config: &FeedbackConfig, api_key: Option<String>) -> Result<Option<Self>, RemoteError> {
        if !config.enabled {
            return Ok(None);
        }
        if config.backend == FeedbackBackend::Canned {
            return Ok(Some(Self::Canned(CannedFeedbackGenerator::new())));
        }

        let api_key = api_key.filter(|key| !key.trim().is_empty()).ok_or_else(|| {
            RemoteError::Config(format!(
                "feedback is enabled but {} is not set",
                config.api_key_env
            ))
        })?;
        let backend = create_backend(
            config.backend,
            LlmBackendConfig::from_feedback(config, api_key),
        )?;
        let prompt = PromptTemplate::load(config.template_path.as_deref())?;

        tracing::info!(
            backend = backend.name(),
            model = %config.model,
            custom_template = config.template_path.is_some(),
            "feedback generator ready"
        );
        Ok(Some(Self::Llm(Box::new(LlmFeedbackGenerator::new(
            backend, prompt,
        )))))
    }

    /// Label for logging.
    pub fn name(&self) -> &str {
        match self {
            Self::Llm(generator) => generator.backend_name(),
            Self::Canned(_) => "canned",
        }
    }
}

impl FeedbackGenerator for AnyFeedbackGenerator {
    async fn describe(&self, event_description: &str) -> Result<String, GenerationError> {
        match self {
            Self::Llm(generator) => generator.describe(event_description).await,
            Self::Canned(generator) => generator.describe(event_description).await,
        }
    }
}

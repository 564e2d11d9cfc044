//! Feedback prompt rendering via `minijinja`.
//!
//! The built-in template asks for one concise improvement suggestion for a
//! commit message. Operators can replace it with a template file (see
//! `feedback.template_path`) without recompiling; the template receives a
//! single variable, `message`.

use std::path::Path;

use minijinja::{Environment, context};

use crate::error::RemoteError;

/// Name the template is registered under.
const TEMPLATE_NAME: &str = "feedback";

/// Built-in user prompt.
pub const DEFAULT_TEMPLATE: &str = "Analyze the following commit message and suggest how the \
related code might be improved: \"{{ message }}\". Keep the suggestion concise and actionable.";

/// System message sent with every prompt.
pub const SYSTEM_PROMPT: &str =
    "You are a code reviewer. Reply with a single short, practical suggestion in plain text.";

/// The complete rendered prompt ready to send to an LLM backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    /// System message.
    pub system: String,
    /// User message.
    pub user: String,
}

/// A compiled feedback template.
pub struct PromptTemplate {
    env: Environment<'static>,
}

impl PromptTemplate {
    /// The built-in template.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Template`] if the template fails to compile.
    pub fn builtin() -> Result<Self, RemoteError> {
        let mut env = Environment::new();
        env.add_template(TEMPLATE_NAME, DEFAULT_TEMPLATE)
            .map_err(|e| RemoteError::Template(format!("failed to add feedback template: {e}")))?;
        Ok(Self { env })
    }

    /// Load the template from a file.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Template`] if the file cannot be read or does
    /// not compile.
    pub fn from_file(path: &Path) -> Result<Self, RemoteError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            RemoteError::Template(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut env = Environment::new();
        env.add_template_owned(TEMPLATE_NAME, source)
            .map_err(|e| RemoteError::Template(format!("failed to add feedback template: {e}")))?;
        Ok(Self { env })
    }

    /// Use `path` when given, the built-in template otherwise.
    ///
    /// # Errors
    ///
    /// See [`from_file`](Self::from_file).
    pub fn load(path: Option<&Path>) -> Result<Self, RemoteError> {
        path.map_or_else(Self::builtin, Self::from_file)
    }

    /// Render the prompt for one event description.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Template`] if rendering fails.
    pub fn render(&self, message: &str) -> Result<RenderedPrompt, RemoteError> {
        let user = self
            .env
            .get_template(TEMPLATE_NAME)
            .map_err(|e| RemoteError::Template(format!("missing feedback template: {e}")))?
            .render(context! { message => message })
            .map_err(|e| RemoteError::Template(format!("feedback render failed: {e}")))?;
        Ok(RenderedPrompt {
            system: SYSTEM_PROMPT.to_owned(),
            user,
        })
    }
}

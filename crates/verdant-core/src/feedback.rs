//! Natural-language feedback seam.

use std::future::Future;

/// Errors from a feedback generator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The backend request failed.
    #[error("feedback backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// The backend answered but produced no text.
    #[error("feedback backend returned no text")]
    EmptyResponse,
}

/// Produces a short suggestion for an activity event description.
pub trait FeedbackGenerator: Send + Sync {
    /// Describe `event_description` (typically a commit message).
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError`] if no suggestion could be produced.
    fn describe(
        &self,
        event_description: &str,
    ) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

/// Offline generator returning a fixed suggestion.
#[derive(Debug, Clone, Copy, Default)]
pub struct CannedFeedbackGenerator;

impl CannedFeedbackGenerator {
    /// Create a canned generator.
    pub const fn new() -> Self {
        Self
    }
}

impl FeedbackGenerator for CannedFeedbackGenerator {
    async fn describe(&self, event_description: &str) -> Result<String, GenerationError> {
        Ok(format!(
            "Suggestion for '{event_description}': Consider adding unit tests and improving variable names."
        ))
    }
}

//! Remote collaborators for Verdant.
//!
//! Implements the core seams against network services: the GitHub commits
//! API as an [`ActivitySource`](verdant_core::source::ActivitySource), and
//! LLM chat APIs as a [`FeedbackGenerator`](verdant_core::feedback::FeedbackGenerator).
//!
//! # Modules
//!
//! - [`github`] -- Commits API client, pagination and failure classification
//! - [`llm`] -- LLM backend dispatch (`OpenAI`-compatible, Anthropic, Gemini)
//! - [`prompt`] -- `minijinja` feedback prompt
//! - [`feedback`] -- Generator wiring a backend and a prompt together
//! - [`error`] -- Shared error types

pub mod error;
pub mod feedback;
pub mod github;
pub mod llm;
pub mod prompt;

pub use error::RemoteError;
pub use feedback::{AnyFeedbackGenerator, LlmFeedbackGenerator};
pub use github::{GitHubActivitySource, RepoTarget};
pub use llm::{LlmBackend, LlmBackendConfig};
pub use prompt::{PromptTemplate, RenderedPrompt};

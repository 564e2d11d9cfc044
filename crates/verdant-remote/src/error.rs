//! Error types for the remote collaborators.
//!
//! [`RemoteError`] covers construction and transport problems. At the core
//! trait boundaries it is translated into [`SourceError`] or
//! [`GenerationError`], which is all the reconciler and driver see.

use verdant_core::feedback::GenerationError;
use verdant_core::source::SourceError;

/// Errors raised while building or calling a remote collaborator.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The HTTP client could not be built or a request failed.
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),

    /// Configuration is invalid or a required secret is missing.
    #[error("config error: {0}")]
    Config(String),

    /// Failed to load or render a prompt template.
    #[error("template render error: {0}")]
    Template(String),

    /// An LLM backend returned an error or an unusable response.
    #[error("LLM backend error: {0}")]
    LlmBackend(String),
}

impl From<RemoteError> for GenerationError {
    fn from(err: RemoteError) -> Self {
        Self::Backend {
            message: err.to_string(),
        }
    }
}

/// Translate a transport failure into a [`SourceError`].
pub fn source_error(err: &reqwest::Error) -> SourceError {
    if err.is_decode() {
        SourceError::Decode {
            message: err.to_string(),
        }
    } else {
        SourceError::Network {
            message: err.to_string(),
        }
    }
}

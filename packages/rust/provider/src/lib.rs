//! Search-augmented text-completion providers.
//!
//! The enrichment engine only needs a single-turn "prompt in, text out" call.
//! [`SearchProvider`] is that contract; [`ProviderFactory`] builds one provider
//! per credential. [`GeminiFactory`] talks to the Gemini REST API with the
//! Google Search tool enabled.

mod gemini;

use async_trait::async_trait;
use medcontact_shared::{Credential, Result};

pub use gemini::{GeminiFactory, GeminiProvider};

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// Failure of a single provider call, classified for the retry loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Network failure, timeout, rate limit, server error, or empty answer.
    /// Worth retrying after a backoff.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Rejected credential, unknown model, or malformed request.
    /// Retrying cannot help.
    #[error("fatal provider failure: {0}")]
    Fatal(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A single-turn, search-augmented text completion.
///
/// Implementations must decode deterministically (temperature 0).
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Send `prompt` and return the full response text.
    async fn complete(&self, prompt: &str) -> std::result::Result<String, ProviderError>;
}

/// Builds a provider bound to one credential.
pub trait ProviderFactory: Send + Sync + 'static {
    type Provider: SearchProvider + 'static;

    /// Construct the provider channel. Fails when the credential is unusable.
    fn connect(&self, credential: &Credential) -> Result<Self::Provider>;
}

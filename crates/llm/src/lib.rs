//! Lexis LLM provider infrastructure adapter.
//!
//! Implements the [`pipeline::LlmProvider`] trait for OpenAI-compatible
//! chat-completions APIs. Additional providers are added as new modules in
//! this crate without any changes to the `pipeline` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All HTTP transport, request formatting, response
//! parsing, rate-limit header tracking, and exponential back-off live here.
//! The [`pipeline`] crate sees only [`pipeline::LlmProvider`].
//!
//! ## Composition
//!
//! ```rust,ignore
//! let provider = OpenAiProvider::new(OpenAiConfig::new(api_key))?;
//! let provider = RetryingProvider::new(provider, RetryConfig::default());
//! let pipeline = ExtractionPipeline::new(agent, task, Arc::new(provider));
//! ```

pub mod openai;
pub mod retry;
mod wire;

pub use openai::{OpenAiConfig, OpenAiProvider, RateLimitSnapshot, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use retry::{RetryConfig, RetryingProvider};

use thiserror::Error;

/// A provider could not be constructed from its configuration.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No API key was supplied.
    #[error("API key is not set")]
    MissingApiKey,

    /// The base URL is not an absolute http(s) URL.
    #[error("invalid base URL '{0}': expected an http:// or https:// URL")]
    InvalidBaseUrl(String),

    /// The HTTP client could not be built (TLS backend initialisation).
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

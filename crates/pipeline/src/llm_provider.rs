//! The LLM port: the only way the pipeline talks to a model.
//!
//! Infrastructure crates (see the `llm` crate) implement [`LlmProvider`] for
//! concrete APIs. Authentication, timeouts and retry/back-off live behind this
//! trait; the pipeline issues exactly one [`LlmProvider::complete`] call per
//! extraction.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{ModelName, RetryPolicy, TokenUsage};

/// A fully rendered request for one completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Model to run the completion on.
    pub model: ModelName,
    /// Agent persona and instructions.
    pub system_prompt: String,
    /// Rendered task prompt.
    pub user_prompt: String,
    /// JSON Schema the response must follow, for providers that support
    /// structured output. Providers without that feature ignore it.
    pub response_schema: Option<Value>,
    /// Sampling temperature; `None` uses the provider default.
    pub temperature: Option<f32>,
}

/// Raw output of one completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Model text, unparsed.
    pub content: String,
    /// Token usage, when the provider reports it.
    pub usage: Option<TokenUsage>,
}

/// Failures raised by an [`LlmProvider`].
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum LlmError {
    /// The request never produced an HTTP response (DNS, TLS, connection reset).
    #[error("Network error: {message}")]
    Network {
        /// Transport error description.
        message: String,
    },

    /// No response within the configured deadline.
    #[error("Request timed out after {after:?}")]
    Timeout {
        /// The deadline that elapsed.
        after: Duration,
    },

    /// Credentials were missing or rejected.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Provider error text.
        message: String,
    },

    /// The provider throttled the request.
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Delay suggested by the provider, if any.
        retry_after: Option<Duration>,
        /// Provider error text.
        message: String,
    },

    /// The provider failed internally (HTTP 5xx).
    #[error("Provider error (HTTP {status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Provider error text.
        message: String,
    },

    /// The provider rejected the request (non-auth, non-throttle HTTP 4xx).
    #[error("API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Provider error text.
        message: String,
    },

    /// The provider answered successfully but returned no completion text.
    #[error("Provider returned no completion")]
    EmptyResponse,

    /// The provider's response envelope could not be decoded.
    #[error("Invalid provider response: {message}")]
    InvalidResponse {
        /// Decoder error description.
        message: String,
    },
}

impl LlmError {
    /// Whether re-issuing the same request may succeed.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            LlmError::Network { .. } | LlmError::Timeout { .. } | LlmError::Server { .. } => {
                RetryPolicy::Retryable { after: None }
            }
            LlmError::RateLimited { retry_after, .. } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            LlmError::Authentication { .. }
            | LlmError::Api { .. }
            | LlmError::EmptyResponse
            | LlmError::InvalidResponse { .. } => RetryPolicy::NonRetryable,
        }
    }
}

/// A backend able to turn an [`LlmRequest`] into raw model output.
///
/// Implementations must be safe to share across concurrent extractions.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name for logs (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Runs one completion.
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

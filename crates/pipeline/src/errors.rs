//! Top-level error and retry-policy types for the extraction pipeline.
//!
//! [`ExtractionError`] is the single error type returned by
//! [`crate::ExtractionPipeline`]. Component-level errors (template rendering,
//! LLM transport, schema validation) are defined in their respective modules
//! and wrapped here unchanged.
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{InputTextError, LlmError, SchemaValidationError, TemplateError};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// - `Retryable` errors: API timeouts, transient rate-limit responses,
///   provider-side 5xx failures.
/// - `NonRetryable` errors: invalid configuration, rejected input, template
///   errors, rejected credentials, output that failed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from `Retry-After` or `x-ratelimit-reset-requests` response
    /// headers).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means retry
        /// immediately or apply the caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetryPolicy::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Pipeline-level errors
// ---------------------------------------------------------------------------

/// Every way an extraction can fail.
///
/// The pipeline performs no local recovery: each variant reaches the caller
/// exactly as it was raised.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum ExtractionError {
    /// Agent or task descriptors are missing or malformed.
    ///
    /// Produced at construction time; a pipeline never exists with an invalid
    /// configuration.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The input text was rejected before any LLM call.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InputTextError),

    /// The task's prompt template could not be rendered.
    #[error("Prompt render error: {0}")]
    PromptRender(#[from] TemplateError),

    /// The LLM provider failed.
    #[error("LLM dispatch error: {0}")]
    LlmDispatch(#[from] LlmError),

    /// The model's output did not conform to the extraction schema.
    #[error("Schema validation error: {0}")]
    SchemaValidation(#[from] SchemaValidationError),
}

impl ExtractionError {
    /// Shorthand for [`ExtractionError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        ExtractionError::Configuration {
            message: message.into(),
        }
    }

    /// Whether the caller may re-run the same extraction.
    ///
    /// Only transient provider failures are retryable.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            ExtractionError::LlmDispatch(err) => err.retry_policy(),
            _ => RetryPolicy::NonRetryable,
        }
    }

    /// Short stable label for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionError::Configuration { .. } => "configuration",
            ExtractionError::InvalidInput(_) => "invalid_input",
            ExtractionError::PromptRender(_) => "prompt_render",
            ExtractionError::LlmDispatch(_) => "llm_dispatch",
            ExtractionError::SchemaValidation(_) => "schema_validation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_dispatch_errors_are_retryable() {
        let transient = ExtractionError::from(LlmError::Server {
            status: 502,
            message: "bad gateway".into(),
        });
        assert!(transient.retry_policy().is_retryable());

        let auth = ExtractionError::from(LlmError::Authentication {
            message: "invalid key".into(),
        });
        assert_eq!(auth.retry_policy(), RetryPolicy::NonRetryable);

        let config = ExtractionError::configuration("no agent");
        assert_eq!(config.retry_policy(), RetryPolicy::NonRetryable);
        assert_eq!(config.kind(), "configuration");
    }

    #[test]
    fn test_display_carries_component_detail() {
        let err = ExtractionError::from(TemplateError::UnmatchedBrace { position: 3 });
        assert_eq!(
            err.to_string(),
            "Prompt render error: unmatched '{' at position 3 in template"
        );
        assert_eq!(err.kind(), "prompt_render");
    }
}

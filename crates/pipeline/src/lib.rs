//! Core extraction domain for Lexis.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type and error type used by the vocabulary extraction pipeline, plus the
//! [`LlmProvider`] port that infrastructure crates implement.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; the `llm` crate defines *how* to reach a model
//! and the `cli` crate decides *where* configuration comes from.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`TaskName`, `ModelName`, `ExtractionRunId`, ...) |
//! | [`types`] | Shared value types (`SourceText`, `CefrLevel`, `TokenUsage`, `Timestamp`) |
//! | [`schema`] | `ExtractionResult` and the output schema validator |
//! | [`template`] | Prompt template parsing and rendering |
//! | [`descriptors`] | Validated agent and task descriptors |
//! | [`llm_provider`] | The `LlmProvider` port and its request/response/error types |
//! | [`extraction`] | `ExtractionPipeline`, the single-stage executor |
//! | [`errors`] | Top-level error and retry-policy types |
//!
//! ## Example
//!
//! ```rust,ignore
//! let agent = AgentDescriptor::new(role, goal, backstory, "gpt-4o-mini")?;
//! let task = TaskDescriptor::new("word_extraction_task", "Extract words from {text}", "JSON")?;
//! let pipeline = ExtractionPipeline::new(agent, task, Arc::new(provider));
//!
//! let result = pipeline.extract("Ala ma kota.").await?;
//! println!("{} words at level {}", result.total_words, result.language_level);
//! ```

pub mod descriptors;
pub mod errors;
pub mod extraction;
pub mod identifiers;
pub mod llm_provider;
pub mod schema;
pub mod template;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use descriptors::{AgentDescriptor, TaskDescriptor, LEVEL_VARIABLE, TEXT_VARIABLE};
pub use errors::{ExtractionError, RetryPolicy};
pub use extraction::{ExtractionPipeline, RunRecord, RunState};
pub use identifiers::{AgentRole, ExtractionRunId, ModelName, TaskName};
pub use llm_provider::{LlmError, LlmProvider, LlmRequest, LlmResponse};
pub use schema::{
    extraction_result_from_value, parse_extraction_result, ExtractionResult, SchemaRules,
    SchemaValidationError, SchemaViolation,
};
pub use template::{PromptTemplate, TemplateError};
pub use types::{
    CefrLevel, InputTextError, ParseCefrLevelError, SourceText, Timestamp, TokenCount, TokenUsage,
    DEFAULT_MAX_INPUT_WORDS,
};

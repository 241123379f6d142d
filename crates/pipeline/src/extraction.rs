//! The single-stage extraction pipeline.
//!
//! [`ExtractionPipeline`] binds one [`AgentDescriptor`], one [`TaskDescriptor`]
//! and an [`LlmProvider`] into an executable unit. Each call runs the same four
//! steps to completion:
//!
//! 1. validate the input text against the task's word limit;
//! 2. render the task prompt;
//! 3. dispatch one completion through the provider;
//! 4. validate the raw output into an [`ExtractionResult`].
//!
//! The pipeline holds no mutable state, so one instance can serve any number
//! of concurrent calls. Errors from every step propagate unchanged; reporting
//! them is left to the caller.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, field, info, info_span, Instrument};

use crate::{
    parse_extraction_result, AgentDescriptor, CefrLevel, ExtractionError, ExtractionResult,
    ExtractionRunId, LlmProvider, LlmRequest, TaskDescriptor, TaskName, Timestamp,
};

/// Terminal state of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum RunState {
    /// The run produced a validated record.
    Done(ExtractionResult),
    /// The run failed; no record was produced.
    Failed(ExtractionError),
}

/// Audit record of one extraction run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub run_id: ExtractionRunId,
    pub task: TaskName,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub state: RunState,
}

impl RunRecord {
    /// Converts the record into the plain result of the run.
    pub fn into_result(self) -> Result<ExtractionResult, ExtractionError> {
        match self.state {
            RunState::Done(result) => Ok(result),
            RunState::Failed(err) => Err(err),
        }
    }

    /// Returns `true` if the run finished with a record.
    pub fn is_done(&self) -> bool {
        matches!(self.state, RunState::Done(_))
    }
}

/// One agent, one task, one stage.
#[derive(Clone)]
pub struct ExtractionPipeline {
    agent: AgentDescriptor,
    task: TaskDescriptor,
    llm: Arc<dyn LlmProvider>,
}

impl std::fmt::Debug for ExtractionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionPipeline")
            .field("agent", &self.agent)
            .field("task", &self.task)
            .field("llm", &self.llm.name())
            .finish()
    }
}

impl ExtractionPipeline {
    pub fn new(agent: AgentDescriptor, task: TaskDescriptor, llm: Arc<dyn LlmProvider>) -> Self {
        Self { agent, task, llm }
    }

    pub fn agent(&self) -> &AgentDescriptor {
        &self.agent
    }

    pub fn task(&self) -> &TaskDescriptor {
        &self.task
    }

    /// Extracts vocabulary from `text`, using the task's default level for
    /// `{language_level}`.
    pub async fn extract(&self, text: &str) -> Result<ExtractionResult, ExtractionError> {
        self.run(text, None).await.into_result()
    }

    /// Extracts vocabulary from `text` targeting `level`.
    pub async fn extract_at_level(
        &self,
        text: &str,
        level: CefrLevel,
    ) -> Result<ExtractionResult, ExtractionError> {
        self.run(text, Some(level)).await.into_result()
    }

    /// Runs one extraction and returns the full [`RunRecord`].
    pub async fn run(&self, text: &str, level: Option<CefrLevel>) -> RunRecord {
        let run_id = ExtractionRunId::new_random();
        let started_at = Timestamp::now();
        let span = info_span!(
            "extraction",
            %run_id,
            task = %self.task.name(),
            model = %self.agent.model(),
            provider = self.llm.name(),
            outcome = field::Empty,
        );

        let state = match self.execute(text, level).instrument(span.clone()).await {
            Ok(result) => {
                span.record("outcome", "done");
                RunState::Done(result)
            }
            Err(err) => {
                span.record("outcome", err.kind());
                span.in_scope(|| {
                    debug!(error_kind = err.kind(), error = %err, "extraction failed");
                });
                RunState::Failed(err)
            }
        };

        RunRecord {
            run_id,
            task: self.task.name().clone(),
            started_at,
            finished_at: Timestamp::now(),
            state,
        }
    }

    async fn execute(
        &self,
        text: &str,
        level: Option<CefrLevel>,
    ) -> Result<ExtractionResult, ExtractionError> {
        let source = self.task.accept_input(text)?;
        let user_prompt = self.task.render_prompt(&source, level)?;
        debug!(
            input_words = source.word_count(),
            prompt_len = user_prompt.len(),
            "prompt rendered"
        );

        let request = LlmRequest {
            model: self.agent.model().clone(),
            system_prompt: self.agent.system_prompt(),
            user_prompt,
            response_schema: Some(ExtractionResult::json_schema()),
            temperature: self.agent.temperature(),
        };
        let response = self.llm.complete(request).await?;
        if let Some(usage) = response.usage {
            debug!(
                prompt_tokens = %usage.prompt,
                completion_tokens = %usage.completion,
                "completion received"
            );
        }

        let result = parse_extraction_result(&response.content, self.task.rules())?;
        if !result.count_matches() {
            debug!(
                total_words = result.total_words,
                words = result.words.len(),
                "reported word count differs from extracted words"
            );
        }
        info!(
            words = result.words.len(),
            language_level = %result.language_level,
            "extraction complete"
        );
        Ok(result)
    }
}

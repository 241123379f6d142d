//! Chat-completions wire format.
//!
//! Only the fields this adapter sends or reads are modelled; everything else
//! in the provider's envelope is ignored on decode.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use pipeline::{LlmRequest, TokenCount, TokenUsage};

/// Name under which the response schema is registered with the provider.
const SCHEMA_NAME: &str = "extraction_result";

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ResponseFormat<'a> {
    JsonSchema { json_schema: JsonSchemaFormat<'a> },
    JsonObject,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSchemaFormat<'a> {
    pub name: &'static str,
    pub strict: bool,
    pub schema: &'a Value,
}

impl<'a> ChatRequest<'a> {
    /// Builds the request body.
    ///
    /// With `structured_output` disabled the schema is dropped and the
    /// provider is only asked for a JSON object.
    pub fn from_llm_request(request: &'a LlmRequest, structured_output: bool) -> Self {
        let response_format = match (&request.response_schema, structured_output) {
            (Some(schema), true) => Some(ResponseFormat::JsonSchema {
                json_schema: JsonSchemaFormat {
                    name: SCHEMA_NAME,
                    strict: true,
                    schema,
                },
            }),
            (Some(_), false) => Some(ResponseFormat::JsonObject),
            (None, _) => None,
        };

        Self {
            model: request.model.as_str(),
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            response_format,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    pub content: Option<String>,
    pub refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        TokenUsage {
            prompt: TokenCount::new(usage.prompt_tokens),
            completion: TokenCount::new(usage.completion_tokens),
        }
    }
}

/// `{"error": {"message": "..."}}` error envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: String,
}

//! HTTP-level tests for the OpenAI-compatible provider.

use std::sync::Arc;
use std::time::Duration;

use llm::{OpenAiConfig, OpenAiProvider, RetryConfig, RetryingProvider};
use pipeline::{
    AgentDescriptor, CefrLevel, ExtractionError, ExtractionPipeline, ExtractionResult, LlmError,
    LlmProvider, LlmRequest, ModelName, TaskDescriptor, TokenCount,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> OpenAiProvider {
    OpenAiProvider::new(
        OpenAiConfig::new("sk-test")
            .with_base_url(server.uri())
            .with_timeout(Duration::from_secs(5)),
    )
    .expect("provider")
}

fn request() -> LlmRequest {
    LlmRequest {
        model: ModelName::new("gpt-4o-mini").unwrap(),
        system_prompt: "You are a Polish teacher.".into(),
        user_prompt: "Extract words from: Ala ma kota".into(),
        response_schema: Some(ExtractionResult::json_schema()),
        temperature: Some(0.0),
    }
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1234567890,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 42, "completion_tokens": 17, "total_tokens": 59 }
    }))
}

fn fox_content() -> String {
    json!({
        "words": ["quick", "brown", "fox", "jumps"],
        "total_words": 4,
        "language_level": "B1",
        "analysis": "Contains common adjectives and an irregular verb."
    })
    .to_string()
}

#[tokio::test]
async fn test_completion_sends_expected_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "temperature": 0.0,
            "messages": [
                { "role": "system", "content": "You are a Polish teacher." },
                { "role": "user", "content": "Extract words from: Ala ma kota" }
            ],
            "response_format": { "type": "json_schema" }
        })))
        .respond_with(completion("{\"ok\":true}"))
        .expect(1)
        .mount(&server)
        .await;

    let response = provider(&server).complete(request()).await.unwrap();

    assert_eq!(response.content, "{\"ok\":true}");
    let usage = response.usage.expect("usage reported");
    assert_eq!(usage.prompt, TokenCount::new(42));
    assert_eq!(usage.completion, TokenCount::new(17));
}

#[tokio::test]
async fn test_unauthorized_maps_to_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
        })))
        .mount(&server)
        .await;

    let err = provider(&server).complete(request()).await.unwrap_err();
    assert_eq!(
        err,
        LlmError::Authentication {
            message: "Incorrect API key provided".into()
        }
    );
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "2")
                .insert_header("x-ratelimit-remaining-requests", "0")
                .set_body_json(json!({ "error": { "message": "Rate limit reached" } })),
        )
        .mount(&server)
        .await;

    let provider = provider(&server);
    let err = provider.complete(request()).await.unwrap_err();
    assert_eq!(
        err,
        LlmError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
            message: "Rate limit reached".into()
        }
    );
    assert_eq!(
        provider.last_rate_limit().and_then(|s| s.remaining_requests),
        Some(0)
    );
}

#[tokio::test]
async fn test_empty_choices_and_null_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": null } }]
        })))
        .mount(&server)
        .await;

    let provider = provider(&server);
    assert_eq!(provider.complete(request()).await.unwrap_err(), LlmError::EmptyResponse);
    assert_eq!(provider.complete(request()).await.unwrap_err(), LlmError::EmptyResponse);
}

#[tokio::test]
async fn test_undecodable_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = provider(&server).complete(request()).await.unwrap_err();
    assert!(matches!(err, LlmError::InvalidResponse { .. }), "{err:?}");
}

#[tokio::test]
async fn test_retrying_provider_recovers_from_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let retrying = RetryingProvider::new(
        provider(&server),
        RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
        },
    );
    let response = retrying.complete(request()).await.unwrap();
    assert_eq!(response.content, "{}");
}

#[tokio::test]
async fn test_pipeline_end_to_end_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion(&format!("```json\n{}\n```", fox_content())))
        .mount(&server)
        .await;

    let agent = AgentDescriptor::new(
        "English vocabulary extractor",
        "Find words worth learning",
        "You teach English.",
        "gpt-4o-mini",
    )
    .unwrap();
    let task = TaskDescriptor::new(
        "word_extraction_task",
        "Extract {language_level} words from: {text}",
        "JSON",
    )
    .unwrap();
    let pipeline = ExtractionPipeline::new(agent, task, Arc::new(provider(&server)));

    let result = pipeline
        .extract_at_level("The quick brown fox jumps.", CefrLevel::B1)
        .await
        .unwrap();
    assert_eq!(result.words, vec!["quick", "brown", "fox", "jumps"]);
    assert_eq!(result.total_words, 4);

    let sent = server.received_requests().await.expect("recording enabled");
    let body: serde_json::Value = serde_json::from_slice(&sent[0].body).unwrap();
    assert!(body["messages"][1]["content"]
        .as_str()
        .unwrap()
        .starts_with("Extract B1 words from: The quick brown fox jumps."));
}

#[tokio::test]
async fn test_pipeline_surfaces_transport_failure() {
    // Nothing listens on the reserved discard port.
    let provider = OpenAiProvider::new(
        OpenAiConfig::new("sk-test")
            .with_base_url("http://127.0.0.1:9")
            .with_timeout(Duration::from_secs(2)),
    )
    .unwrap();
    let agent = AgentDescriptor::new("r", "g", "b", "m").unwrap();
    let task = TaskDescriptor::new("t", "{text}", "JSON").unwrap();
    let pipeline = ExtractionPipeline::new(agent, task, Arc::new(provider));

    let err = pipeline.extract("The quick brown fox jumps.").await.unwrap_err();
    assert!(
        matches!(
            err,
            ExtractionError::LlmDispatch(LlmError::Network { .. } | LlmError::Timeout { .. })
        ),
        "{err:?}"
    );
}

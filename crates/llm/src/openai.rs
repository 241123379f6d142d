//! OpenAI-compatible chat-completions provider.
//!
//! Works against any endpoint that speaks the `/chat/completions` protocol
//! (OpenAI, Azure OpenAI behind a proxy, OpenRouter, vLLM, Ollama).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use pipeline::{LlmError, LlmProvider, LlmRequest, LlmResponse};

use crate::wire::{ChatRequest, ChatResponse, ErrorEnvelope};
use crate::ProviderError;

/// Default endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default per-request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest provider error text carried into an [`LlmError`].
const MAX_ERROR_TEXT: usize = 500;

/// Connection settings for [`OpenAiProvider`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Send the response schema as a strict `json_schema` response format.
    /// Disable for endpoints that only understand `json_object`.
    pub structured_output: bool,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            structured_output: true,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_structured_output(mut self, enabled: bool) -> Self {
        self.structured_output = enabled;
        self
    }
}

/// Rate-limit budget reported on the most recent response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub remaining_requests: Option<u64>,
    pub remaining_tokens: Option<u64>,
}

impl RateLimitSnapshot {
    fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            remaining_requests: header_u64(headers, "x-ratelimit-remaining-requests"),
            remaining_tokens: header_u64(headers, "x-ratelimit-remaining-tokens"),
        }
    }
}

/// [`LlmProvider`] over an OpenAI-compatible HTTP API.
pub struct OpenAiProvider {
    http_client: Client,
    config: OpenAiConfig,
    rate_limit: Mutex<Option<RateLimitSnapshot>>,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey);
        }
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ProviderError::InvalidBaseUrl(config.base_url));
        }
        let config = OpenAiConfig { base_url, ..config };

        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            config,
            rate_limit: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Rate-limit headers seen on the last response, if the provider sends them.
    pub fn last_rate_limit(&self) -> Option<RateLimitSnapshot> {
        self.rate_limit.lock().ok().and_then(|guard| *guard)
    }

    fn record_rate_limit(&self, headers: &HeaderMap) {
        let snapshot = RateLimitSnapshot::from_headers(headers);
        if snapshot == RateLimitSnapshot::default() {
            return;
        }
        if snapshot.remaining_requests == Some(0) {
            warn!(base_url = %self.config.base_url, "request budget exhausted");
        }
        if let Ok(mut guard) = self.rate_limit.lock() {
            *guard = Some(snapshot);
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout {
                after: self.config.timeout,
            }
        } else {
            LlmError::Network {
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = Instant::now();
        let body = ChatRequest::from_llm_request(&request, self.config.structured_output);

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "LLM request failed");
                self.transport_error(e)
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        self.record_rate_limit(&headers);

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %truncate(&error_text, 200), "LLM API error");
            return Err(status_error(status, &headers, &error_text));
        }

        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        let chat: ChatResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse {
                message: e.to_string(),
            })?;

        let message = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or(LlmError::EmptyResponse)?;
        let content = match (message.content, message.refusal) {
            (Some(content), _) if !content.trim().is_empty() => content,
            (_, Some(refusal)) => {
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: format!("model refused: {refusal}"),
                })
            }
            _ => return Err(LlmError::EmptyResponse),
        };

        debug!(
            model = %request.model,
            duration_ms = start.elapsed().as_millis() as u64,
            content_len = content.len(),
            "chat completion"
        );

        Ok(LlmResponse {
            content,
            usage: chat.usage.map(Into::into),
        })
    }
}

/// Maps a non-2xx response onto the [`LlmError`] taxonomy.
fn status_error(status: StatusCode, headers: &HeaderMap, body: &str) -> LlmError {
    let message = error_message(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Authentication { message },
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            retry_after: retry_after(headers),
            message,
        },
        s if s.is_server_error() => LlmError::Server {
            status: s.as_u16(),
            message,
        },
        s => LlmError::Api {
            status: s.as_u16(),
            message,
        },
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) if body.trim().is_empty() => "no error body".to_string(),
        Err(_) => truncate(body.trim(), MAX_ERROR_TEXT),
    }
}

/// `Retry-After` (seconds) takes precedence over
/// `x-ratelimit-reset-requests` (e.g. `"1s"`, `"6m0s"`, `"250ms"`).
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_str(headers, RETRY_AFTER.as_str())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .or_else(|| {
            header_str(headers, "x-ratelimit-reset-requests").and_then(parse_reset_duration)
        })
}

/// Parses Go-style durations such as `"1h2m3.5s"` or `"20ms"`. Values that do
/// not fit in a [`Duration`] yield `None`.
fn parse_reset_duration(value: &str) -> Option<Duration> {
    let mut rest = value.trim();
    if rest.is_empty() {
        return None;
    }
    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let (unit_secs, unit_len) = if rest.starts_with("ms") {
            (0.001, 2)
        } else if rest.starts_with('h') {
            (3600.0, 1)
        } else if rest.starts_with('m') {
            (60.0, 1)
        } else if rest.starts_with('s') {
            (1.0, 1)
        } else {
            return None;
        };
        rest = &rest[unit_len..];
        let part = Duration::try_from_secs_f64(number * unit_secs).ok()?;
        total = total.checked_add(part)?;
    }
    Some(total)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name).and_then(|v| v.trim().parse().ok())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated {} bytes]", &s[..end], s.len() - end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_config_validation() {
        assert!(matches!(
            OpenAiProvider::new(OpenAiConfig::new("  ")),
            Err(ProviderError::MissingApiKey)
        ));
        assert!(matches!(
            OpenAiProvider::new(OpenAiConfig::new("sk-test").with_base_url("api.example.com")),
            Err(ProviderError::InvalidBaseUrl(_))
        ));

        let provider =
            OpenAiProvider::new(OpenAiConfig::new("sk-test").with_base_url("http://localhost:1234/v1/"))
                .unwrap();
        assert_eq!(provider.base_url(), "http://localhost:1234/v1");
        assert!(provider.last_rate_limit().is_none());
    }

    #[test]
    fn test_reset_duration_parsing() {
        assert_eq!(parse_reset_duration("1s"), Some(Duration::from_secs(1)));
        assert_eq!(parse_reset_duration("6m0s"), Some(Duration::from_secs(360)));
        assert_eq!(parse_reset_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_reset_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_reset_duration(""), None);
        assert_eq!(parse_reset_duration("soon"), None);
        assert_eq!(parse_reset_duration("5"), None);
    }

    #[test]
    fn test_retry_after_prefers_standard_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset-requests", HeaderValue::from_static("6m0s"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(360)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(2)));

        assert_eq!(retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn test_out_of_range_hints_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("1e30"));
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("-5"));
        headers.insert(
            "x-ratelimit-reset-requests",
            HeaderValue::from_static("99999999999999999999999h"),
        );
        assert_eq!(retry_after(&headers), None);

        assert_eq!(parse_reset_duration("1e400s"), None);
        assert_eq!(
            parse_reset_duration("5000000000000000h5000000000000000h"),
            None
        );
    }

    #[test]
    fn test_status_mapping() {
        let headers = HeaderMap::new();
        let body = r#"{"error": {"message": "Incorrect API key provided"}}"#;
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, &headers, body),
            LlmError::Authentication {
                message: "Incorrect API key provided".into()
            }
        );
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, &headers, "upstream down"),
            LlmError::Server { status: 502, ref message } if message == "upstream down"
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, &headers, ""),
            LlmError::Api { status: 400, ref message } if message == "no error body"
        ));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "ąćęłńóśźż";
        let out = truncate(s, 3);
        assert!(out.starts_with('ą'));
        assert!(out.contains("truncated"));
        assert_eq!(truncate("short", 10), "short");
    }
}

mod sse;
pub mod prompt;
pub mod stream;

use std::{fmt, time::Duration};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sse::{SseDecoder, SseEvent};

pub use prompt::{build_prompt, StoryRequest, StoryStyle, UnknownStyle};
pub use stream::{drive, GenerationOutcome, StoryEvent, StoryGenerator, StoryStream, TIMEOUT_WARNING};

/// Groq's OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_MAX_TOKENS: u16 = 1500;
pub const DEFAULT_TEMPERATURE: f32 = 0.9;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Errors raised while talking to the generative text service.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request timed out")]
    Timeout,

    #[error("LLM service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM transport error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Malformed stream chunk: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid LLM configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Http(e)
        }
    }
}

/// Content fragments of one streamed completion, in arrival order.
pub type Fragments = BoxStream<'static, Result<String, LlmError>>;

/// Anything that can turn a prompt into a stream of text fragments.
///
/// [`ChatClient`] is the production implementation; tests plug in scripted
/// sources so the accumulation logic runs without a network.
#[async_trait]
pub trait FragmentSource: Send + Sync {
    async fn open(&self, prompt: &str) -> Result<Fragments, LlmError>;
}

/// Connection settings for the chat completion service.
///
/// The API key is passed in by the caller; nothing in this crate reads the
/// process environment.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u16,
    pub temperature: f32,
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Structure for the chat completion request
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u16,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// One `data:` payload of a streamed completion
#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    content: Option<String>,
}

/// Extract the text fragment carried by a chunk, if any.
fn parse_chunk(payload: &str) -> Result<Option<String>, LlmError> {
    let chunk: ChatChunk = serde_json::from_str(payload)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

/// Streaming client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatClient {
    client: Client,
    config: LlmConfig,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::Config("API key must not be empty".to_string()));
        }
        // Only the connect phase is bounded here. Waiting for fragments is
        // bounded per read by the generator, so a long story can still
        // stream for more than one timeout period.
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(LlmError::Http)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl FragmentSource for ChatClient {
    async fn open(&self, prompt: &str) -> Result<Fragments, LlmError> {
        let req_body = ChatRequest {
            model: &self.config.model,
            messages: vec![Message { role: "user", content: prompt }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: true,
        };

        tracing::debug!(
            url = %self.completions_url(),
            model = %self.config.model,
            prompt_len = prompt.len(),
            "Opening chat completion stream"
        );

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&req_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut bytes = Box::pin(response.bytes_stream());
        let fragments = async_stream::try_stream! {
            let mut decoder = SseDecoder::default();
            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(LlmError::from)?;
                for event in decoder.push(&chunk) {
                    match event {
                        SseEvent::Done => break 'read,
                        SseEvent::Data(payload) => {
                            if let Some(fragment) = parse_chunk(&payload)? {
                                yield fragment;
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(fragments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk_with_content() {
        let payload = r#"{"id":"x","choices":[{"index":0,"delta":{"content":"Once"}}]}"#;
        assert_eq!(parse_chunk(payload).unwrap(), Some("Once".to_string()));
    }

    #[test]
    fn test_parse_chunk_without_content() {
        let role_only = r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_chunk(role_only).unwrap(), None);

        let finished = r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_chunk(finished).unwrap(), None);

        let empty = r#"{"choices":[{"delta":{"content":""}}]}"#;
        assert_eq!(parse_chunk(empty).unwrap(), None);

        assert_eq!(parse_chunk(r#"{"choices":[]}"#).unwrap(), None);
    }

    #[test]
    fn test_parse_chunk_malformed() {
        assert!(matches!(parse_chunk("{not json"), Err(LlmError::Decode(_))));
    }

    #[test]
    fn test_request_serialization() {
        let req = ChatRequest {
            model: DEFAULT_MODEL,
            messages: vec![Message { role: "user", content: "tell me a story" }],
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            stream: true,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "llama-3.1-8b-instant");
        assert_eq!(json["max_tokens"], 1500);
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "tell me a story");
        assert!((json["temperature"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_config_defaults() {
        let config = LlmConfig::new("gsk_test");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_tokens, 1500);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let config = LlmConfig::new("gsk_secret_value");
        let printed = format!("{config:?}");
        assert!(!printed.contains("gsk_secret_value"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_client_rejects_blank_key() {
        assert!(matches!(
            ChatClient::new(LlmConfig::new("   ")),
            Err(LlmError::Config(_))
        ));
    }

    #[test]
    fn test_completions_url_trims_slash() {
        let client = ChatClient::new(
            LlmConfig::new("gsk_test").with_base_url("http://localhost:9000/v1/"),
        )
        .unwrap();
        assert_eq!(client.completions_url(), "http://localhost:9000/v1/chat/completions");
    }
}

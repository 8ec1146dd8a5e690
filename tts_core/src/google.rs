//! Speech engine backed by the public Google Translate TTS endpoint.
//!
//! `GET {base_url}/translate_tts?ie=UTF-8&client=tw-ob&tl=en&q=...` answers
//! with `audio/mpeg` bytes. One request accepts at most 100 characters, so
//! longer text is sent as several indexed chunks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Serialize;

use crate::{SpeechChunk, SpeechEngine, TtsError};

const MAX_CHUNK_CHARS: usize = 100;
// The endpoint serves an HTML error page to unknown clients.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";

#[derive(Debug, Serialize)]
struct TranslateTtsQuery<'a> {
    ie: &'static str,
    client: &'static str,
    tl: &'a str,
    q: &'a str,
    total: usize,
    idx: usize,
    textlen: usize,
    ttsspeed: f32,
}

#[derive(Debug, Clone)]
pub struct GoogleTtsConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Read more slowly.
    pub slow: bool,
}

impl Default for GoogleTtsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://translate.google.com".to_string(),
            timeout_secs: 60,
            slow: false,
        }
    }
}

impl GoogleTtsConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

pub struct GoogleTranslateTts {
    client: Client,
    config: GoogleTtsConfig,
}

impl GoogleTranslateTts {
    pub fn new(config: GoogleTtsConfig) -> Result<Self, TtsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TtsError::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn with_default_config() -> Result<Self, TtsError> {
        Self::new(GoogleTtsConfig::default())
    }

    fn tts_url(&self) -> String {
        format!("{}/translate_tts", self.config.base_url.trim_end_matches('/'))
    }

    fn query<'a>(&self, chunk: &SpeechChunk<'a>) -> TranslateTtsQuery<'a> {
        TranslateTtsQuery {
            ie: "UTF-8",
            client: "tw-ob",
            tl: chunk.lang,
            q: chunk.text,
            total: chunk.total,
            idx: chunk.index,
            textlen: chunk.text.chars().count(),
            ttsspeed: if self.config.slow { 0.24 } else { 1.0 },
        }
    }
}

#[async_trait]
impl SpeechEngine for GoogleTranslateTts {
    async fn synthesize_chunk(&self, chunk: SpeechChunk<'_>) -> Result<Vec<u8>, TtsError> {
        tracing::debug!(
            url = %self.tts_url(),
            lang = chunk.lang,
            idx = chunk.index,
            total = chunk.total,
            text_len = chunk.text.len(),
            "Sending TTS chunk request"
        );

        let response = self
            .client
            .get(self.tts_url())
            .query(&self.query(&chunk))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TtsError::Timeout
                } else if e.is_connect() {
                    TtsError::Network(format!("Cannot connect to TTS service: {}", e))
                } else {
                    TtsError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TtsError::Service(format!("HTTP {}: {}", status, error_text)));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.is_empty() && !content_type.starts_with("audio/") {
            return Err(TtsError::InvalidResponse(format!(
                "expected audio, got {content_type}"
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TtsError::Timeout
                } else {
                    TtsError::InvalidResponse(format!("Failed to read audio: {}", e))
                }
            })?
            .to_vec();
        if audio.is_empty() {
            return Err(TtsError::InvalidResponse("empty audio body".to_string()));
        }

        Ok(audio)
    }

    fn max_chunk_chars(&self) -> usize {
        MAX_CHUNK_CHARS
    }

    async fn health_check(&self) -> bool {
        let chunk = SpeechChunk {
            text: "ok",
            lang: "en",
            index: 0,
            total: 1,
        };
        self.synthesize_chunk(chunk).await.is_ok()
    }
}

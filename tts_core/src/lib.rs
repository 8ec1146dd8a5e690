mod artifact;
mod fake;
mod google;
pub mod text;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use async_trait::async_trait;
use thiserror::Error;

pub use artifact::{AudioArtifact, MP3_CONTENT_TYPE};
pub use fake::{FakeSpeechEngine, FakeSpeechEngineConfig};
pub use google::{GoogleTranslateTts, GoogleTtsConfig};

use crate::text::{clean_text_for_speech, split_into_chunks};

pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("Text to synthesize is empty")]
    EmptyText,

    #[error("Network error: {0}")]
    Network(String),

    #[error("TTS request timed out")]
    Timeout,

    #[error("TTS service error: {0}")]
    Service(String),

    #[error("Invalid TTS response: {0}")]
    InvalidResponse(String),

    #[error("Audio file error: {0}")]
    Io(#[from] std::io::Error),
}

/// One piece of text sent to a speech engine.
#[derive(Debug, Clone, Copy)]
pub struct SpeechChunk<'a> {
    pub text: &'a str,
    pub lang: &'a str,
    /// Zero-based position of this chunk.
    pub index: usize,
    pub total: usize,
}

/// A text-to-speech backend producing MP3 audio.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Synthesize one chunk of at most [`max_chunk_chars`](Self::max_chunk_chars)
    /// characters into MP3 bytes.
    async fn synthesize_chunk(&self, chunk: SpeechChunk<'_>) -> Result<Vec<u8>, TtsError>;

    fn max_chunk_chars(&self) -> usize {
        100
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Turns finished stories into playable MP3 artifacts.
#[derive(Clone)]
pub struct Synthesizer {
    engine: Arc<dyn SpeechEngine>,
    language: String,
    temp_dir: Option<PathBuf>,
}

impl Synthesizer {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            engine,
            language: DEFAULT_LANGUAGE.to_string(),
            temp_dir: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Write artifacts into `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn temp_dir(&self) -> Option<&Path> {
        self.temp_dir.as_deref()
    }

    /// Whether the engine currently answers.
    pub async fn health_check(&self) -> bool {
        self.engine.health_check().await
    }

    /// Synthesize `text` into a new MP3 artifact.
    ///
    /// Empty or whitespace-only text is rejected with [`TtsError::EmptyText`]
    /// before the engine is called. Any engine failure aborts the whole
    /// synthesis; nothing is retried.
    pub async fn synthesize(&self, text: &str) -> Result<AudioArtifact, TtsError> {
        if text.trim().is_empty() {
            return Err(TtsError::EmptyText);
        }

        let start_time = Instant::now();
        let cleaned = clean_text_for_speech(text);
        let chunks = split_into_chunks(&cleaned, self.engine.max_chunk_chars());
        if chunks.is_empty() {
            return Err(TtsError::EmptyText);
        }

        // MP3 frames are self-delimiting, so per-chunk audio concatenates
        // into one playable stream.
        let mut audio = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            let request = SpeechChunk {
                text: chunk,
                lang: &self.language,
                index,
                total: chunks.len(),
            };
            let segment = self.engine.synthesize_chunk(request).await?;
            audio.extend_from_slice(&segment);
        }
        if audio.is_empty() {
            return Err(TtsError::InvalidResponse("engine returned no audio".to_string()));
        }

        let temp_dir = self.temp_dir.clone();
        let artifact = tokio::task::spawn_blocking(move || {
            AudioArtifact::write(&audio, temp_dir.as_deref())
        })
        .await
        .map_err(|e| TtsError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        tracing::info!(
            chunks = chunks.len(),
            text_len = text.len(),
            audio_bytes = artifact.len(),
            path = %artifact.path().display(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Speech synthesis completed"
        );

        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthesizer(engine: Arc<FakeSpeechEngine>) -> Synthesizer {
        Synthesizer::new(engine)
    }

    #[tokio::test]
    async fn test_synthesize_produces_mp3() {
        let engine = Arc::new(FakeSpeechEngine::default());
        let artifact = synthesizer(engine.clone()).synthesize("Hello world.").await.unwrap();

        assert!(!artifact.is_empty());
        assert_eq!(artifact.content_type(), "audio/mpeg");
        let bytes = artifact.read_bytes().await.unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xFB]);
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn test_health_check_uses_engine() {
        assert!(synthesizer(Arc::new(FakeSpeechEngine::default())).health_check().await);
    }

    #[tokio::test]
    async fn test_empty_text_fails_fast() {
        let engine = Arc::new(FakeSpeechEngine::default());
        let synth = synthesizer(engine.clone());

        assert!(matches!(synth.synthesize("").await, Err(TtsError::EmptyText)));
        assert!(matches!(synth.synthesize(" \n\t ").await, Err(TtsError::EmptyText)));
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn test_long_text_is_chunked_in_order() {
        let engine = Arc::new(FakeSpeechEngine::new(FakeSpeechEngineConfig {
            frames_per_chunk: 1,
            fail: false,
        }));
        let story = "Luna: \"Hello!\" [forest sounds] ".repeat(20);
        let artifact = synthesizer(engine.clone()).synthesize(&story).await.unwrap();

        let calls = engine.calls();
        assert!(calls > 1);
        assert_eq!(artifact.len(), (calls * FakeSpeechEngine::silent_frame().len()) as u64);
    }

    #[tokio::test]
    async fn test_engine_failure_propagates() {
        let engine = Arc::new(FakeSpeechEngine::failing());
        let result = synthesizer(engine).synthesize("Hello world.").await;
        assert!(matches!(result, Err(TtsError::Service(_))));
    }

    #[tokio::test]
    async fn test_artifact_written_to_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let synth = synthesizer(Arc::new(FakeSpeechEngine::default())).with_temp_dir(dir.path());
        let artifact = synth.synthesize("Hello world.").await.unwrap();
        assert!(artifact.path().starts_with(dir.path()));
        assert_eq!(synth.language(), "en");
    }

    #[tokio::test]
    #[ignore = "needs network access to translate.google.com"]
    async fn test_google_engine_synthesizes_hello_world() {
        let engine = Arc::new(GoogleTranslateTts::with_default_config().unwrap());
        let artifact = Synthesizer::new(engine).synthesize("Hello world.").await.unwrap();
        assert!(artifact.len() > 0);
    }
}

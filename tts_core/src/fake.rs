//! Offline speech engine that answers every chunk with silent MP3 frames.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::{SpeechChunk, SpeechEngine, TtsError};

/// MPEG-1 Layer III, 128 kbit/s, 44.1 kHz, mono, no CRC.
const FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0xC0];
/// 144 * 128000 / 44100, without padding.
const FRAME_LEN: usize = 417;

#[derive(Debug, Clone)]
pub struct FakeSpeechEngineConfig {
    /// Frames returned per chunk; one frame is about 26 ms of silence.
    pub frames_per_chunk: usize,
    /// Answer every call with a service error instead of audio.
    pub fail: bool,
}

impl Default for FakeSpeechEngineConfig {
    fn default() -> Self {
        Self {
            frames_per_chunk: 4,
            fail: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeSpeechEngine {
    config: FakeSpeechEngineConfig,
    calls: AtomicUsize,
}

impl FakeSpeechEngine {
    pub fn new(config: FakeSpeechEngineConfig) -> Self {
        Self {
            config,
            calls: AtomicUsize::new(0),
        }
    }

    /// An engine whose every call fails.
    pub fn failing() -> Self {
        Self::new(FakeSpeechEngineConfig {
            fail: true,
            ..Default::default()
        })
    }

    /// Number of chunks requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// One silent frame.
    pub fn silent_frame() -> Vec<u8> {
        let mut frame = vec![0u8; FRAME_LEN];
        frame[..FRAME_HEADER.len()].copy_from_slice(&FRAME_HEADER);
        frame
    }
}

#[async_trait]
impl SpeechEngine for FakeSpeechEngine {
    async fn synthesize_chunk(&self, chunk: SpeechChunk<'_>) -> Result<Vec<u8>, TtsError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.config.fail {
            return Err(TtsError::Service(format!(
                "fake engine refused chunk {} of {}",
                chunk.index + 1,
                chunk.total
            )));
        }

        let frame = Self::silent_frame();
        Ok(frame.repeat(self.config.frames_per_chunk))
    }
}

//! Story request → streamed story → spoken story.
//!
//! The pipeline reports progress as [`PipelineEvent`]s on a channel, so the
//! same run can feed a WebSocket or be collected into one HTTP response.

use std::time::Instant;

use llm_core::{drive, GenerationOutcome, LlmError, StoryGenerator, StoryRequest};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tts_core::{AudioArtifact, Synthesizer, TtsError};

use crate::metrics::PipelineMetrics;

/// Blocking phase the pipeline is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Generating,
    Synthesizing,
    Complete,
}

impl Stage {
    pub fn message(self) -> &'static str {
        match self {
            Stage::Generating => "Crafting your fairy tale...",
            Stage::Synthesizing => "Generating audio for the full story...",
            Stage::Complete => "Your story is ready",
        }
    }
}

#[derive(Debug)]
pub enum PipelineEvent {
    Status(Stage),
    /// The whole story so far; replaces whatever was shown before.
    Story(String),
    Audio(AudioArtifact),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Story generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(#[from] TtsError),
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub story: String,
    pub timed_out: bool,
    pub audio_bytes: Option<u64>,
}

/// Blank stories are never sent to the speech engine.
pub fn should_synthesize(text: &str) -> bool {
    !text.trim().is_empty()
}

pub struct StoryPipeline {
    generator: StoryGenerator,
    synthesizer: Synthesizer,
    metrics: PipelineMetrics,
}

impl StoryPipeline {
    pub fn new(generator: StoryGenerator, synthesizer: Synthesizer, metrics: PipelineMetrics) -> Self {
        Self {
            generator,
            synthesizer,
            metrics,
        }
    }

    pub async fn speech_ready(&self) -> bool {
        self.synthesizer.health_check().await
    }

    /// Run one request to the end, pushing progress into `events`.
    ///
    /// Generation always runs to completion or timeout. A timed-out story is
    /// still spoken. Non-timeout generation failures and synthesis failures
    /// end the run with an error.
    pub async fn run(
        &self,
        request: &StoryRequest,
        events: &mpsc::Sender<PipelineEvent>,
    ) -> Result<RunSummary, PipelineError> {
        let start_time = Instant::now();
        let _ = events.send(PipelineEvent::Status(Stage::Generating)).await;

        let outcome = drive(self.generator.generate(request), |text| {
            let events = events.clone();
            async move {
                let _ = events.send(PipelineEvent::Story(text)).await;
            }
        })
        .await;
        self.metrics.record_generation(&outcome, start_time.elapsed());

        let (story, timed_out) = match outcome {
            GenerationOutcome::Completed(story) => (story, false),
            GenerationOutcome::TimedOut(story) => (story, true),
            GenerationOutcome::Failed(e) => return Err(e.into()),
        };
        tracing::info!(
            story_len = story.len(),
            timed_out,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Story generation finished"
        );

        let mut audio_bytes = None;
        if !should_synthesize(&story) {
            tracing::info!("Story is empty, skipping speech synthesis");
            self.metrics.record_skipped_synthesis();
        } else if events.is_closed() {
            tracing::debug!("Listener went away, skipping speech synthesis");
        } else {
            let _ = events.send(PipelineEvent::Status(Stage::Synthesizing)).await;
            let synth_start = Instant::now();
            let artifact = match self.synthesizer.synthesize(&story).await {
                Ok(artifact) => artifact,
                Err(e) => {
                    self.metrics.record_synthesis_failure();
                    return Err(e.into());
                }
            };
            self.metrics.record_synthesis(synth_start.elapsed(), artifact.len());
            audio_bytes = Some(artifact.len());
            let _ = events.send(PipelineEvent::Audio(artifact)).await;
        }

        let _ = events.send(PipelineEvent::Status(Stage::Complete)).await;
        Ok(RunSummary {
            story,
            timed_out,
            audio_bytes,
        })
    }
}

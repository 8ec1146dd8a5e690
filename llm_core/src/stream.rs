//! Accumulating story snapshots from a fragment stream.
//!
//! A generation yields the whole story so far on every fragment, never a
//! delta, so a consumer can simply overwrite what it displays. Snapshots only
//! ever grow. The one exception to plain growth is the terminal
//! [`StoryEvent::TimedOut`] snapshot, which is the previous snapshot with
//! [`TIMEOUT_WARNING`] appended.

use std::{future::Future, sync::Arc, time::Duration};

use futures::{stream::BoxStream, StreamExt};

use crate::{prompt::build_prompt, FragmentSource, LlmError, StoryRequest};

/// Appended to the story when the service stops answering in time.
pub const TIMEOUT_WARNING: &str =
    "\n⚠️ Story generation timed out. Try a shorter prompt or increase timeout.";

/// One snapshot of a story being generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryEvent {
    /// Everything received so far.
    Partial(String),
    /// Final snapshot after a timeout; the stream ends after it.
    TimedOut(String),
}

impl StoryEvent {
    pub fn text(&self) -> &str {
        match self {
            StoryEvent::Partial(text) | StoryEvent::TimedOut(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            StoryEvent::Partial(text) | StoryEvent::TimedOut(text) => text,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StoryEvent::TimedOut(_))
    }
}

/// How a generation ended.
#[derive(Debug)]
pub enum GenerationOutcome {
    Completed(String),
    TimedOut(String),
    Failed(LlmError),
}

impl GenerationOutcome {
    /// The last text shown to the user. Empty for a failed generation.
    pub fn text(&self) -> &str {
        match self {
            GenerationOutcome::Completed(text) | GenerationOutcome::TimedOut(text) => text,
            GenerationOutcome::Failed(_) => "",
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, GenerationOutcome::TimedOut(_))
    }
}

/// Snapshots of one generation. Non-timeout failures arrive as a single
/// `Err` item, after which the stream ends.
pub type StoryStream = BoxStream<'static, Result<StoryEvent, LlmError>>;

/// Turns story requests into snapshot streams.
#[derive(Clone)]
pub struct StoryGenerator {
    source: Arc<dyn FragmentSource>,
    timeout: Duration,
}

impl StoryGenerator {
    /// `timeout` bounds opening the stream and each wait for a fragment.
    pub fn new(source: Arc<dyn FragmentSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start a fresh generation. Nothing is sent until the stream is polled;
    /// every call issues its own remote request.
    pub fn generate(&self, request: &StoryRequest) -> StoryStream {
        let prompt = build_prompt(request);
        let source = Arc::clone(&self.source);
        let timeout = self.timeout;

        Box::pin(async_stream::stream! {
            let mut story = String::new();

            let opened = match tokio::time::timeout(timeout, source.open(&prompt)).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout),
            };

            match opened {
                Ok(mut fragments) => loop {
                    let next = match tokio::time::timeout(timeout, fragments.next()).await {
                        Ok(next) => next,
                        Err(_) => Some(Err(LlmError::Timeout)),
                    };
                    match next {
                        None => {
                            tracing::debug!(story_len = story.len(), "Story stream completed");
                            break;
                        }
                        Some(Ok(fragment)) => {
                            if fragment.is_empty() {
                                continue;
                            }
                            story.push_str(&fragment);
                            yield Ok(StoryEvent::Partial(story.clone()));
                        }
                        Some(Err(LlmError::Timeout)) => {
                            tracing::warn!(
                                story_len = story.len(),
                                timeout_secs = timeout.as_secs(),
                                "Story stream timed out"
                            );
                            yield Ok(StoryEvent::TimedOut(format!("{story}{TIMEOUT_WARNING}")));
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "Story stream failed");
                            yield Err(e);
                            break;
                        }
                    }
                },
                Err(LlmError::Timeout) => {
                    tracing::warn!(timeout_secs = timeout.as_secs(), "Opening story stream timed out");
                    yield Ok(StoryEvent::TimedOut(TIMEOUT_WARNING.to_string()));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Could not open story stream");
                    yield Err(e);
                }
            }
        })
    }
}

/// Consume a generation, handing every snapshot to `on_snapshot`, and report
/// how it ended.
pub async fn drive<F, Fut>(mut stream: StoryStream, mut on_snapshot: F) -> GenerationOutcome
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut last = String::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(StoryEvent::Partial(text)) => {
                on_snapshot(text.clone()).await;
                last = text;
            }
            Ok(StoryEvent::TimedOut(text)) => {
                on_snapshot(text.clone()).await;
                return GenerationOutcome::TimedOut(text);
            }
            Err(e) => return GenerationOutcome::Failed(e),
        }
    }
    GenerationOutcome::Completed(last)
}

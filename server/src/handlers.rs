use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    Json,
};
use futures_util::{Sink, SinkExt, StreamExt};
use llm_core::{StoryRequest, StoryStyle};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tts_core::AudioArtifact;

use crate::error::ApiError;
use crate::metrics::{MetricsResponse, SystemMetrics};
use crate::pipeline::{PipelineError, PipelineEvent};
use crate::validation::validate_story_form;
use crate::AppState;

/// Pipeline events buffered between the run and the consumer
const EVENT_BUFFER: usize = 32;

/// The three fields a user fills in.
#[derive(Debug, Clone, Deserialize)]
pub struct StoryForm {
    /// Comma separated names, may be blank.
    #[serde(default)]
    pub characters: String,
    pub setting: String,
    pub style: String,
}

impl StoryForm {
    pub fn into_request(self) -> Result<StoryRequest, ApiError> {
        let style = validate_story_form(&self.characters, &self.setting, &self.style)?;
        Ok(StoryRequest::from_form(&self.characters, &self.setting, style))
    }
}

#[derive(Debug, Serialize)]
pub struct AudioPayload {
    pub content_type: &'static str,
    pub audio_base64: String,
    pub size_bytes: u64,
}

impl AudioPayload {
    async fn from_artifact(artifact: &AudioArtifact) -> Result<Self, ApiError> {
        let audio_base64 = artifact
            .to_base64()
            .await
            .map_err(PipelineError::from)?;
        Ok(Self {
            content_type: artifact.content_type(),
            audio_base64,
            size_bytes: artifact.len(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StoryResponse {
    pub story: String,
    pub timed_out: bool,
    pub audio: Option<AudioPayload>,
}

#[derive(Serialize)]
pub struct StyleInfo {
    key: StoryStyle,
    label: &'static str,
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_styles() -> Json<Vec<StyleInfo>> {
    Json(
        StoryStyle::ALL
            .iter()
            .map(|&style| StyleInfo {
                key: style,
                label: style.label(),
            })
            .collect(),
    )
}

/// Generate a story and its audio in one request.
pub async fn story_endpoint(
    State(state): State<AppState>,
    Json(form): Json<StoryForm>,
) -> Result<Json<StoryResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start_time = Instant::now();

    let result = run_story(&state, form).await;
    state.metrics.story.record_request(start_time.elapsed());
    if result.is_err() {
        state.metrics.story.record_error();
    }
    result.map(Json)
}

async fn run_story(state: &AppState, form: StoryForm) -> Result<StoryResponse, ApiError> {
    let request = form.into_request()?;
    info!(
        "Story request: characters={}, setting_len={}, style={}",
        request.characters().len(),
        request.setting().len(),
        request.style()
    );

    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
    let pipeline = state.pipeline.clone();
    let run = async move { pipeline.run(&request, &tx).await };
    let collect = async {
        let mut audio = None;
        while let Some(event) = rx.recv().await {
            if let PipelineEvent::Audio(artifact) = event {
                audio = Some(artifact);
            }
        }
        audio
    };
    let (summary, artifact) = tokio::join!(run, collect);
    let summary = summary?;

    let audio = match artifact {
        Some(artifact) => Some(AudioPayload::from_artifact(&artifact).await?),
        None => None,
    };

    Ok(StoryResponse {
        story: summary.story,
        timed_out: summary.timed_out,
        audio,
    })
}

pub async fn story_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_story_socket(socket, state))
}

fn error_message(err: &ApiError) -> Message {
    let body = json!({
        "type": "error",
        "error": err.to_string(),
        "code": err.status().as_u16(),
    });
    Message::Text(body.to_string().into())
}

async fn event_message(event: PipelineEvent) -> Result<Message, ApiError> {
    let body = match event {
        PipelineEvent::Status(stage) => json!({
            "type": "status",
            "status": stage,
            "message": stage.message(),
        }),
        PipelineEvent::Story(text) => json!({
            "type": "story",
            "text": text,
        }),
        PipelineEvent::Audio(artifact) => {
            let payload = AudioPayload::from_artifact(&artifact).await?;
            json!({
                "type": "audio",
                "content_type": payload.content_type,
                "audio_base64": payload.audio_base64,
                "size_bytes": payload.size_bytes,
            })
        }
    };
    Ok(Message::Text(body.to_string().into()))
}

/// Forward events to `sink` until the run ends or the client leaves.
///
/// An event that cannot be encoded is returned as the failure, and nothing
/// after it is forwarded.
async fn forward_events<S>(events: &mut mpsc::Receiver<PipelineEvent>, sink: &mut S) -> Option<ApiError>
where
    S: Sink<Message> + Unpin,
{
    while let Some(event) = events.recv().await {
        let message = match event_message(event).await {
            Ok(message) => message,
            Err(e) => return Some(e),
        };
        if sink.send(message).await.is_err() {
            info!("Client disconnected while the story was being told");
            break;
        }
    }
    None
}

/// Wait for the first text frame and parse it as a story form.
async fn receive_form(socket: &mut futures_util::stream::SplitStream<WebSocket>) -> Option<Result<StoryForm, ApiError>> {
    while let Some(msg) = socket.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let form = serde_json::from_str::<StoryForm>(&text)
                    .map_err(|e| ApiError::InvalidInput(format!("Malformed story form: {e}")));
                return Some(form);
            }
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket receive error: {e}");
                return None;
            }
        }
    }
    None
}

async fn handle_story_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let request = match receive_form(&mut receiver).await {
        Some(Ok(form)) => form.into_request(),
        Some(Err(e)) => Err(e),
        None => return,
    };
    let request = match request {
        Ok(request) => request,
        Err(e) => {
            let _ = sender.send(error_message(&e)).await;
            let _ = sender.close().await;
            return;
        }
    };

    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start_time = Instant::now();
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
    let pipeline = state.pipeline.clone();
    let task = tokio::spawn(async move { pipeline.run(&request, &tx).await });

    let failure = forward_events(&mut rx, &mut sender).await;
    // a departed client stops further events, the run itself finishes on its own
    drop(rx);

    let outcome = match task.await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(ApiError::from(e)),
        Err(join_err) => Err(ApiError::InternalError(format!("Task join error: {join_err}"))),
    };
    let outcome = match failure {
        Some(e) => Err(e),
        None => outcome,
    };
    state.metrics.story.record_request(start_time.elapsed());
    if let Err(e) = outcome {
        warn!("Story stream failed: {e}");
        state.metrics.story.record_error();
        let _ = sender.send(error_message(&e)).await;
    }
    let _ = sender.close().await;
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let cpu_usage = system.global_cpu_info().cpu_usage();
    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    // Unix-like systems only
    let system_load = {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/proc/loadavg")
                .ok()
                .and_then(|loadavg| loadavg.split_whitespace().next().and_then(|s| s.parse::<f64>().ok()))
        }
        #[cfg(not(unix))]
        None
    };

    Json(MetricsResponse {
        timestamp: chrono::Utc::now(),
        system: SystemMetrics {
            cpu_usage_percent: cpu_usage,
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count: state.request_count.load(Ordering::Relaxed),
            uptime_seconds: state.started_at.elapsed().as_secs(),
            system_load,
        },
        story: state.metrics.story.stats(),
        pipeline: state.metrics.pipeline.stats(),
    })
}

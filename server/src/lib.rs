pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod pipeline;
pub mod validation;

use std::sync::{atomic::AtomicU64, Arc};
use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use llm_core::{ChatClient, StoryGenerator};
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tts_core::{FakeSpeechEngine, GoogleTranslateTts, GoogleTtsConfig, SpeechEngine, Synthesizer};

use crate::config::{ServerConfig, TtsEngineKind};
use crate::metrics::AppMetrics;
use crate::pipeline::StoryPipeline;

/// Story forms are tiny; anything larger is not a form.
const MAX_BODY_BYTES: usize = 16 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<StoryPipeline>,
    pub metrics: AppMetrics,
    pub request_count: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(generator: StoryGenerator, synthesizer: Synthesizer) -> Self {
        let metrics = AppMetrics::new();
        let pipeline = StoryPipeline::new(generator, synthesizer, metrics.pipeline.clone());
        Self {
            pipeline: Arc::new(pipeline),
            metrics,
            request_count: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    /// Wire the production clients from configuration.
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let chat = ChatClient::new(config.llm_config())?;
        info!(
            "LLM client ready: model={}, base_url={}",
            chat.config().model,
            chat.config().base_url
        );
        let generator = StoryGenerator::new(Arc::new(chat), config.llm_timeout());

        let engine: Arc<dyn SpeechEngine> = match config.tts_engine {
            TtsEngineKind::Google => {
                let tts_config = GoogleTtsConfig::new(config.tts_base_url.clone())
                    .with_timeout(config.tts_timeout_secs);
                Arc::new(GoogleTranslateTts::new(tts_config)?)
            }
            TtsEngineKind::Fake => {
                warn!("TTS_ENGINE=fake, stories will be read as silence");
                Arc::new(FakeSpeechEngine::default())
            }
        };
        let synthesizer = Synthesizer::new(engine).with_language(config.tts_language.clone());
        info!("TTS engine ready: {:?} ({})", config.tts_engine, synthesizer.language());

        Ok(Self::new(generator, synthesizer))
    }
}

/// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
    request.headers_mut().insert("x-request-id", request_id.clone());
    let mut response = next.run(request).await;
    response.headers_mut().insert("x-request-id", request_id);
    response
}

/// All routes, mounted at the root and under `/api`.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/healthz", get(handlers::health_check))
        .route("/styles", get(handlers::list_styles))
        .route("/story", post(handlers::story_endpoint))
        .route("/story/stream", get(handlers::story_ws))
        .route("/metrics", get(handlers::metrics_endpoint));

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    match (&config.cors_allowed_origins, origins.is_empty()) {
        (Some(_), false) => {
            info!("CORS configured for {} origin(s)", origins.len());
            base.allow_origin(AllowOrigin::list(origins))
        }
        (Some(_), true) => {
            warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
            base.allow_origin(Any)
        }
        (None, _) => {
            warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
            base.allow_origin(Any)
        }
    }
}

/// Seconds between two replenished rate limit permits. A zero rate is treated
/// as one request per minute; rates above 60/min replenish every second.
fn replenish_interval_secs(rate_limit_per_minute: u32) -> u64 {
    (60 / rate_limit_per_minute.max(1)).max(1) as u64
}

/// CORS, request timeout and a global rate limit around the router.
pub fn apply_middleware(app: Router, config: &ServerConfig) -> anyhow::Result<Router> {
    // per_second is the replenish interval in seconds for one request
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(replenish_interval_secs(config.rate_limit_per_minute))
            .burst_size(config.rate_limit_per_minute.max(1))
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", config.rate_limit_per_minute);

    let middleware_stack = ServiceBuilder::new()
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(config))
        .into_inner();

    Ok(app.layer(middleware_stack))
}

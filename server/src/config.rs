// Configuration for the server, read from the process environment

use std::{fmt, str::FromStr, time::Duration};

use llm_core::LlmConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GROQ_API_KEY not found in environment or .env file")]
    MissingCredential,

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Which speech engine turns stories into audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsEngineKind {
    Google,
    /// Silent audio without network access, for demos and tests.
    Fake,
}

impl FromStr for TtsEngineKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "gtts" => Ok(TtsEngineKind::Google),
            "fake" => Ok(TtsEngineKind::Fake),
            _ => Err(()),
        }
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub groq_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub tts_engine: TtsEngineKind,
    pub tts_base_url: String,
    pub tts_language: String,
    pub tts_timeout_secs: u64,
}

impl ServerConfig {
    /// Defaults for everything except the credential.
    pub fn with_api_key(groq_api_key: impl Into<String>) -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: 180,
            cors_allowed_origins: None,
            groq_api_key: groq_api_key.into(),
            llm_base_url: llm_core::DEFAULT_BASE_URL.to_string(),
            llm_model: llm_core::DEFAULT_MODEL.to_string(),
            llm_timeout_secs: llm_core::DEFAULT_TIMEOUT_SECS,
            tts_engine: TtsEngineKind::Google,
            tts_base_url: "https://translate.google.com".to_string(),
            tts_language: tts_core::DEFAULT_LANGUAGE.to_string(),
            tts_timeout_secs: 60,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable lookup. A missing or blank
    /// `GROQ_API_KEY` is fatal; other variables fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let groq_api_key = lookup("GROQ_API_KEY")
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingCredential)?;

        let mut config = Self::with_api_key(groq_api_key);

        if let Some(port) = parsed(&lookup, "PORT")? {
            config.port = port;
        }
        if let Some(rate) = parsed(&lookup, "RATE_LIMIT_PER_MINUTE")? {
            config.rate_limit_per_minute = rate;
        }
        if let Some(secs) = parsed(&lookup, "REQUEST_TIMEOUT_SECS")? {
            config.request_timeout_secs = secs;
        }
        if let Some(url) = non_empty(&lookup, "LLM_BASE_URL") {
            config.llm_base_url = url;
        }
        if let Some(model) = non_empty(&lookup, "LLM_MODEL") {
            config.llm_model = model;
        }
        if let Some(secs) = parsed(&lookup, "LLM_TIMEOUT_SECS")? {
            config.llm_timeout_secs = secs;
        }
        if let Some(engine) = parsed(&lookup, "TTS_ENGINE")? {
            config.tts_engine = engine;
        }
        if let Some(url) = non_empty(&lookup, "TTS_BASE_URL") {
            config.tts_base_url = url;
        }
        if let Some(lang) = non_empty(&lookup, "TTS_LANGUAGE") {
            config.tts_language = lang;
        }
        if let Some(secs) = parsed(&lookup, "TTS_TIMEOUT_SECS")? {
            config.tts_timeout_secs = secs;
        }

        config.cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig::new(self.groq_api_key.clone())
            .with_base_url(self.llm_base_url.clone())
            .with_model(self.llm_model.clone())
            .with_timeout(self.llm_timeout())
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("groq_api_key", &"<redacted>")
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_model", &self.llm_model)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("tts_engine", &self.tts_engine)
            .field("tts_base_url", &self.tts_base_url)
            .field("tts_language", &self.tts_language)
            .field("tts_timeout_secs", &self.tts_timeout_secs)
            .finish()
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match non_empty(lookup, name) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use futures::StreamExt;
use llm_core::{FragmentSource, Fragments, LlmError, StoryGenerator};
use tts_core::{FakeSpeechEngine, Synthesizer};

use fairytale::{build_router, AppState};

/// How a scripted model reply ends after its fragments.
#[derive(Clone, Copy)]
pub enum Ending {
    Done,
    Timeout,
    Fail,
}

/// Model stand-in that replies with fixed fragments.
pub struct ScriptedModel {
    fragments: Vec<String>,
    ending: Ending,
}

impl ScriptedModel {
    pub fn new(fragments: &[&str], ending: Ending) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            ending,
        }
    }
}

#[async_trait]
impl FragmentSource for ScriptedModel {
    async fn open(&self, _prompt: &str) -> Result<Fragments, LlmError> {
        let mut items: Vec<Result<String, LlmError>> =
            self.fragments.iter().cloned().map(Ok).collect();
        match self.ending {
            Ending::Done => {}
            Ending::Timeout => items.push(Err(LlmError::Timeout)),
            Ending::Fail => items.push(Err(LlmError::Status {
                status: 401,
                body: "invalid api key".to_string(),
            })),
        }
        Ok(futures::stream::iter(items).boxed())
    }
}

pub struct TestApp {
    pub router: Router,
    pub engine: Arc<FakeSpeechEngine>,
}

/// Create a test app backed by a scripted model and the silent engine
pub fn create_test_app(model: ScriptedModel) -> TestApp {
    create_test_app_with_engine(model, Arc::new(FakeSpeechEngine::default()))
}

pub fn create_test_app_with_engine(model: ScriptedModel, engine: Arc<FakeSpeechEngine>) -> TestApp {
    let generator = StoryGenerator::new(Arc::new(model), Duration::from_secs(5));
    let synthesizer = Synthesizer::new(engine.clone());
    TestApp {
        router: build_router(AppState::new(generator, synthesizer)),
        engine,
    }
}

pub fn happy_model() -> ScriptedModel {
    ScriptedModel::new(
        &["Once upon a time, ", "Luna found a door in the moon. ", "The end."],
        Ending::Done,
    )
}

pub fn story_form() -> serde_json::Value {
    serde_json::json!({
        "characters": "Luna, Theo",
        "setting": "Enchanted Forest",
        "style": "Magical"
    })
}

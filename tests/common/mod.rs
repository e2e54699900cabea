#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;

use lexiflow_backend::config::EngineConfig;
use lexiflow_backend::db::DatabaseProxy;
use lexiflow_backend::services::llm_provider::{GenerationRequest, LLMError, TextGenerator};
use lexiflow_backend::services::Engine;

/// Generator fake that replays queued replies in order, then falls back to a
/// fixed reply (or an error when none is set).
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    delay: Duration,
    unavailable: bool,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

/// Counts a call as active until dropped, including when the caller
/// abandons the future.
struct ActiveCall<'a>(&'a AtomicUsize);

impl<'a> ActiveCall<'a> {
    fn enter(active: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(active)
    }
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offline() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.replies.lock().push_back(Ok(text.into()));
        self
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.replies.lock().push_back(Err(message.into()));
        self
    }

    pub fn always(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of generate calls that were in progress at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'_, Result<String, LLMError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _active = ActiveCall::enter(&self.active, &self.peak);
            self.prompts.lock().push(request.prompt);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.replies.lock().pop_front();
            match next {
                Some(Ok(text)) => Ok(text),
                Some(Err(message)) => Err(LLMError::Generation(message)),
                None => self
                    .fallback
                    .clone()
                    .ok_or_else(|| LLMError::Generation("script exhausted".to_string())),
            }
        })
    }

    fn is_available(&self) -> bool {
        !self.unavailable
    }
}

pub fn explanation_json(meaning: &str, rating: u8) -> String {
    serde_json::json!({
        "meaning": meaning,
        "example": "This is an example.",
        "example_translation": "Bu bir örnektir.",
        "difficulty_rating": rating,
    })
    .to_string()
}

pub async fn memory_proxy() -> Arc<DatabaseProxy> {
    Arc::new(DatabaseProxy::in_memory().await.expect("in-memory store"))
}

pub async fn engine_with(generator: Arc<ScriptedGenerator>) -> Arc<Engine> {
    engine_with_config(generator, EngineConfig::default()).await
}

pub async fn engine_with_config(generator: Arc<ScriptedGenerator>, config: EngineConfig) -> Arc<Engine> {
    engine_over(memory_proxy().await, generator, config)
}

/// Engine over an existing store, so several engines can share one database.
pub fn engine_over(proxy: Arc<DatabaseProxy>, generator: Arc<ScriptedGenerator>, config: EngineConfig) -> Arc<Engine> {
    let generator: Arc<dyn TextGenerator> = generator;
    Arc::new(Engine::new(proxy, generator, &config))
}

pub async fn create_test_app() -> Router {
    create_test_app_with(Arc::new(ScriptedGenerator::offline())).await
}

pub async fn create_test_app_with(generator: Arc<ScriptedGenerator>) -> Router {
    let generator: Arc<dyn TextGenerator> = generator;
    let state = lexiflow_backend::state_with(Some(memory_proxy().await), generator, &EngineConfig::default());
    lexiflow_backend::create_app_with_state(state)
}

/// App with no store behind it, as when `DATABASE_URL` cannot be opened.
pub fn create_storeless_app() -> Router {
    let generator: Arc<dyn TextGenerator> = Arc::new(ScriptedGenerator::offline());
    let state = lexiflow_backend::state_with(None, generator, &EngineConfig::default());
    lexiflow_backend::create_app_with_state(state)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// `count` distinct letter-only words, e.g. `wa wb ... wba`.
pub fn words(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}{}", letters(i))).collect()
}

fn letters(mut i: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push((b'a' + (i % 26) as u8) as char);
        i /= 26;
        if i == 0 {
            break;
        }
    }
    out.into_iter().rev().collect()
}

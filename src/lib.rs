pub mod config;
pub mod core;
pub mod db;
pub mod logging;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;

use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::EngineConfig;
use crate::db::DatabaseProxy;
use crate::services::llm_provider::{LLMProvider, TextGenerator};
use crate::services::Engine;
use crate::state::AppState;

/// Builds the state from the environment: store from `DATABASE_URL`,
/// generator from `LLM_*`.
pub async fn build_state() -> AppState {
    let db_proxy = match DatabaseProxy::from_env().await {
        Ok(proxy) => Some(Arc::new(proxy)),
        Err(err) => {
            tracing::warn!(error = %err, "database proxy not initialized");
            None
        }
    };

    let generator: Arc<dyn TextGenerator> = Arc::new(LLMProvider::from_env());
    if !generator.is_available() {
        tracing::warn!("LLM_API_KEY not set; explanations and adaptation will degrade");
    }

    state_with(db_proxy, generator, &EngineConfig::from_env())
}

pub fn state_with(
    db_proxy: Option<Arc<DatabaseProxy>>,
    generator: Arc<dyn TextGenerator>,
    config: &EngineConfig,
) -> AppState {
    let engine = db_proxy
        .as_ref()
        .map(|proxy| Arc::new(Engine::new(Arc::clone(proxy), generator, config)));
    AppState::new(db_proxy, engine)
}

pub async fn create_app() -> axum::Router {
    create_app_with_state(build_state().await)
}

pub fn create_app_with_state(state: AppState) -> axum::Router {
    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

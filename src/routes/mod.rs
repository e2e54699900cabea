mod explanations;
mod grammar;
mod health;
mod level;
mod text;
mod vocabulary;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde::de::DeserializeOwned;

use crate::response::{json_error, AppError};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let learners = Router::new()
        .merge(text::router())
        .merge(vocabulary::router())
        .merge(grammar::router())
        .merge(level::router());

    let mut app = Router::new();
    app = app.nest("/api/learners/:learner_id", learners);
    app = app.nest("/api/grammar", grammar::catalog_router());
    app = app.nest("/api/explanations", explanations::router());
    app = app.nest("/health", health::router());

    app.fallback(fallback_handler).with_state(state)
}

/// Decodes a JSON body, turning malformed payloads into a 400 with the standard envelope.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    if body.is_empty() {
        return Err(AppError::validation("request body is required"));
    }
    serde_json::from_slice(body).map_err(|err| AppError::validation(format!("invalid request body: {err}")))
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Route not found").into_response()
}

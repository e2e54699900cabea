use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use crate::response::{ok, AppError};
use crate::routes::parse_json;
use crate::state::AppState;

const MAX_WARM_REQUEST: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/warm", post(warm))
        .route("/stats", get(stats))
        .route("/:word", get(get_explanation))
}

#[derive(Debug, Deserialize)]
struct WarmRequest {
    words: Vec<String>,
}

async fn get_explanation(
    State(state): State<AppState>,
    Path(word): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.require_engine()?;
    let explanation = engine.get_explanation(&word).await?;
    Ok(ok(explanation))
}

async fn warm(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse, AppError> {
    let engine = state.require_engine()?;
    let payload: WarmRequest = parse_json(&body)?;
    if payload.words.is_empty() {
        return Err(AppError::validation("words must be a non-empty array"));
    }
    if payload.words.len() > MAX_WARM_REQUEST {
        return Err(AppError::validation(format!(
            "words array exceeds maximum size of {MAX_WARM_REQUEST}"
        )));
    }
    let report = engine.explanations().warm(&payload.words).await;
    Ok(ok(report))
}

async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let engine = state.require_engine()?;
    let stats = engine.explanations().stats().await?;
    Ok(ok(stats))
}

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::response::{ok, AppError};
use crate::routes::parse_json;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/vocabulary", get(list).put(mark))
        .route("/vocabulary/stats", get(stats))
        .route("/vocabulary/:word", delete(forget))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkRequest {
    word: String,
    status: String,
    #[serde(default)]
    translation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Serialize)]
struct ForgetResponse {
    removed: bool,
}

async fn mark(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.require_engine()?;
    let payload: MarkRequest = parse_json(&body)?;
    let outcome = engine
        .mark_vocabulary(
            &learner_id,
            &payload.word,
            &payload.status,
            payload.translation.as_deref(),
        )
        .await?;
    Ok(ok(outcome))
}

async fn list(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.require_engine()?;
    let entries = engine
        .knowledge()
        .list_vocabulary(
            &learner_id,
            query.status.as_deref(),
            query.limit.unwrap_or(100),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(ok(entries))
}

async fn stats(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.require_engine()?;
    let stats = engine.knowledge().vocabulary_stats(&learner_id).await?;
    Ok(ok(stats))
}

async fn forget(
    State(state): State<AppState>,
    Path((learner_id, word)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.require_engine()?;
    let removed = engine.knowledge().forget_word(&learner_id, &word).await?;
    if !removed {
        return Err(AppError::not_found(format!("'{word}' has no vocabulary entry")));
    }
    Ok(ok(ForgetResponse { removed }))
}

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use crate::response::{ok, AppError};
use crate::routes::parse_json;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/text/analyze", post(analyze))
        .route("/text/suggestions", post(suggestions))
        .route("/text/adapt", post(adapt))
        .route("/adaptations", get(adaptations))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest {
    text: String,
    #[serde(default)]
    warm_explanations: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdaptRequest {
    text: String,
    #[serde(default)]
    target_unknown_percentage: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

async fn analyze(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.require_engine()?;
    let payload: AnalyzeRequest = parse_json(&body)?;

    let analysis = engine.classify_text(&learner_id, &payload.text).await?;

    if payload.warm_explanations && !analysis.unknown_words.is_empty() {
        let cache = Arc::clone(engine.explanations());
        let words = analysis.unknown_words.clone();
        tokio::spawn(async move {
            cache.warm(&words).await;
        });
    }

    Ok(ok(analysis))
}

async fn suggestions(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.require_engine()?;
    let payload: AnalyzeRequest = parse_json(&body)?;
    let ranked = engine.analyzer().suggestions(&payload.text, &learner_id).await?;
    Ok(ok(ranked))
}

async fn adapt(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.require_engine()?;
    let payload: AdaptRequest = parse_json(&body)?;

    // runs detached so a dropped connection does not abandon a half-finished search
    let task = tokio::spawn(async move {
        engine
            .adapt_text(&learner_id, &payload.text, payload.target_unknown_percentage)
            .await
    });
    let result = task
        .await
        .map_err(|err| AppError::internal(format!("adaptation task failed: {err}")))??;

    Ok(ok(result))
}

async fn adaptations(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.require_engine()?;
    let records = engine
        .adaptation()
        .history(&learner_id, query.limit.unwrap_or(20))
        .await?;
    Ok(ok(records))
}

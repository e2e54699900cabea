use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::response::{ok, AppError};
use crate::routes::parse_json;
use crate::services::grammar_catalog::{self, GrammarPattern, CATALOG_VERSION};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/grammar", get(overview).put(mark))
}

pub fn catalog_router() -> Router<AppState> {
    Router::new().route("/catalog", get(catalog))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkRequest {
    pattern_id: String,
    status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogResponse {
    version: i64,
    patterns: &'static [GrammarPattern],
}

async fn mark(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.require_engine()?;
    let payload: MarkRequest = parse_json(&body)?;
    let outcome = engine
        .mark_grammar(&learner_id, &payload.pattern_id, &payload.status)
        .await?;
    Ok(ok(outcome))
}

async fn overview(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.require_engine()?;
    let overview = engine.knowledge().grammar_overview(&learner_id).await?;
    Ok(ok(overview))
}

async fn catalog() -> impl IntoResponse {
    ok(CatalogResponse {
        version: CATALOG_VERSION,
        patterns: grammar_catalog::catalog(),
    })
}

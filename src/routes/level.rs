use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/level", get(get_level))
}

async fn get_level(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.require_engine()?;
    let snapshot = engine.get_level(&learner_id).await?;
    Ok(ok(snapshot))
}

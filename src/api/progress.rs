use axum::{extract::State, routing::post, Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentLearner;
use crate::core::state::AppState;
use crate::schemas::progress::{ActivityRequest, ProgressResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/activity", post(record_activity))
}

async fn record_activity(
    CurrentLearner(learner): CurrentLearner,
    State(state): State<AppState>,
    Json(payload): Json<ActivityRequest>,
) -> Result<Json<ProgressResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let snapshot = state
        .pipeline()
        .record_activity(&learner.id, payload.lesson_id.trim(), payload.activity)
        .await?;

    Ok(Json(ProgressResponse::from(snapshot)))
}

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentLearner;
use crate::core::state::AppState;
use crate::schemas::grading::SubmissionAcceptedResponse;
use crate::services::grading::{AudioUpload, GradingError};

const RATE_WINDOW_SECONDS: u64 = 60;

pub(super) async fn submit_exercise(
    CurrentLearner(learner): CurrentLearner,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmissionAcceptedResponse>), ApiError> {
    let limit = state.settings().grading().submission_rate_limit_per_minute;
    let rate_key = format!("submissions:{}", learner.id);
    let allowed = match state.redis().rate_limit(&rate_key, limit, RATE_WINDOW_SECONDS).await {
        Ok(allowed) => allowed,
        Err(err) => {
            tracing::warn!(error = %err, "Rate limiter unavailable, admitting submission");
            true
        }
    };
    if !allowed {
        return Err(GradingError::RateLimited.into());
    }

    let max_mb = state.settings().grading().max_audio_size_mb;
    let max_bytes = max_mb * 1024 * 1024;
    let mut exercise_id: Option<String> = None;
    let mut audio: Option<Vec<u8>> = None;
    let mut content_type: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        match field.name().unwrap_or("") {
            "exercise_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| ApiError::BadRequest("Invalid exercise_id".to_string()))?;
                exercise_id = Some(text.trim().to_string()).filter(|id| !id.is_empty());
            }
            "audio" => {
                content_type = field.content_type().map(|s| s.to_string());
                let mut bytes = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|_| ApiError::BadRequest("Failed to read audio".to_string()))?
                {
                    if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                        return Err(ApiError::BadRequest(format!(
                            "Audio exceeds {max_mb}MB limit"
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                audio = Some(bytes);
            }
            _ => {}
        }
    }

    let exercise_id =
        exercise_id.ok_or_else(|| ApiError::BadRequest("exercise_id is required".to_string()))?;
    let bytes = audio.ok_or_else(|| ApiError::BadRequest("audio is required".to_string()))?;
    let mime_type = content_type
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let pipeline = state.pipeline();
    let submission = pipeline
        .submit_exercise(&learner.id, &exercise_id, AudioUpload { bytes, mime_type })
        .await?;
    pipeline.spawn_ai_grading(submission.id.clone());

    Ok((StatusCode::ACCEPTED, Json(SubmissionAcceptedResponse::from(&submission))))
}

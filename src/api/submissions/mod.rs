mod review;
mod submit;

use axum::{extract::DefaultBodyLimit, routing::get, routing::post, Router};

use crate::core::state::AppState;

/// Multipart framing on top of the configured audio cap.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub(crate) fn router(max_audio_bytes: usize) -> Router<AppState> {
    Router::new()
        // Learner endpoints
        .route(
            "/",
            post(submit::submit_exercise)
                .layer(DefaultBodyLimit::max(max_audio_bytes + MULTIPART_OVERHEAD_BYTES)),
        )
        .route("/:submission_id/status", get(review::grading_status))
        // Teacher and manager endpoints
        .route("/:submission_id/teacher-score", post(review::submit_teacher_score))
        .route("/:submission_id/reassign", post(review::reassign))
}

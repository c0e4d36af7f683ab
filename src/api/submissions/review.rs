use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentManager, CurrentTeacher, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::grading::{
    AssignmentResponse, GradeResponse, GradingStatusResponse, ReassignRequest, TeacherScoreRequest,
};

pub(super) async fn grading_status(
    Path(submission_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<GradingStatusResponse>, ApiError> {
    let view = state.pipeline().grading_status(&user.id, user.role, &submission_id).await?;
    Ok(Json(GradingStatusResponse::from(view)))
}

pub(super) async fn submit_teacher_score(
    Path(submission_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<TeacherScoreRequest>,
) -> Result<Json<GradeResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let feedback = payload.feedback.map(|text| text.trim().to_string()).filter(|t| !t.is_empty());
    let submission = state
        .pipeline()
        .submit_teacher_score(&teacher.id, &submission_id, payload.score, feedback)
        .await?;

    Ok(Json(GradeResponse::from(&submission)))
}

pub(super) async fn reassign(
    Path(submission_id): Path<String>,
    CurrentManager(manager): CurrentManager,
    State(state): State<AppState>,
    Json(payload): Json<ReassignRequest>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let assignment = state
        .pipeline()
        .reassign(&manager.id, &submission_id, payload.teacher_id.trim(), payload.reason.trim())
        .await?;

    let overdue = assignment.is_overdue(primitive_now_utc());
    Ok(Json(AssignmentResponse::new(&assignment, overdue)))
}

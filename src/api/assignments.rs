use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentManager, CurrentTeacher};
use crate::api::pagination::PaginatedResponse;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories::AssignmentFilter;
use crate::schemas::grading::{AssignmentQueueItem, AssignmentResponse, RevokeRequest};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/teacher/assignments", get(list_teacher_assignments))
        .route("/assignments/:assignment_id/revoke", post(revoke_assignment))
}

async fn list_teacher_assignments(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Query(filter): Query<AssignmentFilter>,
) -> Result<Json<PaginatedResponse<AssignmentQueueItem>>, ApiError> {
    let skip = filter.skip.max(0);
    let limit = filter.limit.clamp(1, 100);
    let (rows, total_count) = state.pipeline().teacher_assignments(&teacher.id, &filter).await?;

    let now = primitive_now_utc();
    let items = rows
        .iter()
        .map(|row| AssignmentQueueItem::new(row, row.assignment.is_overdue(now)))
        .collect();

    Ok(Json(PaginatedResponse { items, total_count, skip, limit }))
}

async fn revoke_assignment(
    Path(assignment_id): Path<String>,
    CurrentManager(manager): CurrentManager,
    State(state): State<AppState>,
    Json(payload): Json<RevokeRequest>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let assignment = state
        .pipeline()
        .revoke_assignment(&manager.id, &assignment_id, payload.reason.trim())
        .await?;

    Ok(Json(AssignmentResponse::new(&assignment, false)))
}

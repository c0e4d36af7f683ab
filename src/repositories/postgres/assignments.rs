use sqlx::PgExecutor;
use time::PrimitiveDateTime;

use crate::db::models::{AssignmentQueueRow, GradingAssignment};
use crate::db::types::{AssignmentStatus, EarningStatus};
use crate::repositories::AssignmentFilter;

const COLUMNS: &str = "id, submission_id, teacher_id, status, assigned_at, deadline_at, \
    completed_at, score, feedback, revoked_by, revoked_at, revocation_reason, created_at, updated_at";

/// Plain read: assignment writes are serialized by the submission row lock.
pub(super) async fn find_by_id<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
) -> Result<Option<GradingAssignment>, sqlx::Error> {
    sqlx::query_as::<_, GradingAssignment>(&format!(
        "SELECT {COLUMNS} FROM grading_assignments WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(super) async fn list_by_submission<'e>(
    executor: impl PgExecutor<'e>,
    submission_id: &str,
) -> Result<Vec<GradingAssignment>, sqlx::Error> {
    sqlx::query_as::<_, GradingAssignment>(&format!(
        "SELECT {COLUMNS}
         FROM grading_assignments
         WHERE submission_id = $1
         ORDER BY created_at, id"
    ))
    .bind(submission_id)
    .fetch_all(executor)
    .await
}

pub(super) async fn upsert<'e>(
    executor: impl PgExecutor<'e>,
    assignment: &GradingAssignment,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO grading_assignments ({COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
         ON CONFLICT (id) DO UPDATE
         SET teacher_id = EXCLUDED.teacher_id,
             status = EXCLUDED.status,
             assigned_at = EXCLUDED.assigned_at,
             deadline_at = EXCLUDED.deadline_at,
             completed_at = EXCLUDED.completed_at,
             score = EXCLUDED.score,
             feedback = EXCLUDED.feedback,
             revoked_by = EXCLUDED.revoked_by,
             revoked_at = EXCLUDED.revoked_at,
             revocation_reason = EXCLUDED.revocation_reason,
             updated_at = EXCLUDED.updated_at"
    ))
    .bind(&assignment.id)
    .bind(&assignment.submission_id)
    .bind(&assignment.teacher_id)
    .bind(assignment.status)
    .bind(assignment.assigned_at)
    .bind(assignment.deadline_at)
    .bind(assignment.completed_at)
    .bind(assignment.score)
    .bind(&assignment.feedback)
    .bind(&assignment.revoked_by)
    .bind(assignment.revoked_at)
    .bind(&assignment.revocation_reason)
    .bind(assignment.created_at)
    .bind(assignment.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub(super) async fn approve_earnings<'e>(
    executor: impl PgExecutor<'e>,
    assignment_id: &str,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE teacher_earnings
         SET status = $1, approved_at = $2
         WHERE assignment_id = $3 AND status = $4",
    )
    .bind(EarningStatus::Approved)
    .bind(now)
    .bind(assignment_id)
    .bind(EarningStatus::Pending)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

const QUEUE_FILTER: &str = "ga.teacher_id = $1
      AND ($2::assignmentstatus IS NULL OR ga.status = $2)
      AND (NOT $3 OR (ga.status = 'assigned' AND ga.deadline_at < $4))";

pub(super) async fn list_for_teacher<'e>(
    executor: impl PgExecutor<'e>,
    teacher_id: &str,
    filter: &AssignmentFilter,
    now: PrimitiveDateTime,
) -> Result<Vec<AssignmentQueueRow>, sqlx::Error> {
    sqlx::query_as::<_, AssignmentQueueRow>(&format!(
        "SELECT ga.id, ga.submission_id, ga.teacher_id, ga.status, ga.assigned_at,
                ga.deadline_at, ga.completed_at, ga.score, ga.feedback, ga.revoked_by,
                ga.revoked_at, ga.revocation_reason, ga.created_at, ga.updated_at,
                s.learner_id, s.exercise_id, s.status AS submission_status, s.ai_score
         FROM grading_assignments ga
         JOIN submissions s ON s.id = ga.submission_id
         WHERE {QUEUE_FILTER}
         ORDER BY ga.deadline_at, ga.id
         OFFSET $5 LIMIT $6"
    ))
    .bind(teacher_id)
    .bind(filter.status)
    .bind(filter.overdue_only)
    .bind(now)
    .bind(filter.skip)
    .bind(filter.limit)
    .fetch_all(executor)
    .await
}

pub(super) async fn count_for_teacher<'e>(
    executor: impl PgExecutor<'e>,
    teacher_id: &str,
    filter: &AssignmentFilter,
    now: PrimitiveDateTime,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM grading_assignments ga WHERE {QUEUE_FILTER}"
    ))
    .bind(teacher_id)
    .bind(filter.status)
    .bind(filter.overdue_only)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(super) async fn count_overdue<'e>(
    executor: impl PgExecutor<'e>,
    now: PrimitiveDateTime,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM grading_assignments WHERE status = $1 AND deadline_at < $2",
    )
    .bind(AssignmentStatus::Assigned)
    .bind(now)
    .fetch_one(executor)
    .await
}

use sqlx::types::Json;
use sqlx::PgExecutor;
use time::PrimitiveDateTime;

use crate::db::models::Submission;
use crate::db::types::SubmissionStatus;

pub(super) const COLUMNS: &str = "id, learner_id, exercise_id, course_id, lesson_progress_id, \
    audio_key, audio_size_bytes, audio_mime_type, transcript, ai_score, ai_axes, ai_explanation, \
    proficiency_band, ai_degraded, teacher_id, teacher_score, teacher_feedback, interim_score, \
    final_score, is_passed, status, submitted_at, ai_started_at, ai_completed_at, reviewed_at, \
    previous_submission_id, revision, created_at, updated_at";

pub(super) async fn find_by_id<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!("SELECT {COLUMNS} FROM submissions WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(super) async fn lock_by_id<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(super) async fn latest_for<'e>(
    executor: impl PgExecutor<'e>,
    learner_id: &str,
    exercise_id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS}
         FROM submissions
         WHERE learner_id = $1 AND exercise_id = $2
         ORDER BY revision DESC
         LIMIT 1
         FOR UPDATE"
    ))
    .bind(learner_id)
    .bind(exercise_id)
    .fetch_optional(executor)
    .await
}

pub(super) async fn insert<'e>(
    executor: impl PgExecutor<'e>,
    submission: &Submission,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO submissions ({COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                 $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29)"
    ))
    .bind(&submission.id)
    .bind(&submission.learner_id)
    .bind(&submission.exercise_id)
    .bind(&submission.course_id)
    .bind(&submission.lesson_progress_id)
    .bind(&submission.audio_key)
    .bind(submission.audio_size_bytes)
    .bind(&submission.audio_mime_type)
    .bind(&submission.transcript)
    .bind(submission.ai_score)
    .bind(submission.ai_axes.as_ref().map(|axes| Json(&axes.0)))
    .bind(&submission.ai_explanation)
    .bind(&submission.proficiency_band)
    .bind(submission.ai_degraded)
    .bind(&submission.teacher_id)
    .bind(submission.teacher_score)
    .bind(&submission.teacher_feedback)
    .bind(submission.interim_score)
    .bind(submission.final_score)
    .bind(submission.is_passed)
    .bind(submission.status)
    .bind(submission.submitted_at)
    .bind(submission.ai_started_at)
    .bind(submission.ai_completed_at)
    .bind(submission.reviewed_at)
    .bind(&submission.previous_submission_id)
    .bind(submission.revision)
    .bind(submission.created_at)
    .bind(submission.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Writes every mutable column. Identity, audio and lineage are fixed at insert.
pub(super) async fn update<'e>(
    executor: impl PgExecutor<'e>,
    submission: &Submission,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE submissions
         SET lesson_progress_id = $1,
             transcript = $2,
             ai_score = $3,
             ai_axes = $4,
             ai_explanation = $5,
             proficiency_band = $6,
             ai_degraded = $7,
             teacher_id = $8,
             teacher_score = $9,
             teacher_feedback = $10,
             interim_score = $11,
             final_score = $12,
             is_passed = $13,
             status = $14,
             ai_started_at = $15,
             ai_completed_at = $16,
             reviewed_at = $17,
             updated_at = $18
         WHERE id = $19",
    )
    .bind(&submission.lesson_progress_id)
    .bind(&submission.transcript)
    .bind(submission.ai_score)
    .bind(submission.ai_axes.as_ref().map(|axes| Json(&axes.0)))
    .bind(&submission.ai_explanation)
    .bind(&submission.proficiency_band)
    .bind(submission.ai_degraded)
    .bind(&submission.teacher_id)
    .bind(submission.teacher_score)
    .bind(&submission.teacher_feedback)
    .bind(submission.interim_score)
    .bind(submission.final_score)
    .bind(submission.is_passed)
    .bind(submission.status)
    .bind(submission.ai_started_at)
    .bind(submission.ai_completed_at)
    .bind(submission.reviewed_at)
    .bind(submission.updated_at)
    .bind(&submission.id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub(super) async fn claim_stale_pending<'e>(
    executor: impl PgExecutor<'e>,
    stale_before: PrimitiveDateTime,
    now: PrimitiveDateTime,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "WITH candidate AS (
            SELECT id
            FROM submissions
            WHERE status = $1
              AND COALESCE(ai_started_at, submitted_at) < $2
            ORDER BY submitted_at
            LIMIT $3
            FOR UPDATE SKIP LOCKED
        )
        UPDATE submissions
        SET ai_started_at = $4,
            updated_at = $4
        FROM candidate
        WHERE submissions.id = candidate.id
        RETURNING submissions.id",
    )
    .bind(SubmissionStatus::PendingAiReview)
    .bind(stale_before)
    .bind(limit)
    .bind(now)
    .fetch_all(executor)
    .await
}

/// Exercises where the learner's latest finalized submission passed.
pub(super) async fn passed_exercises<'e>(
    executor: impl PgExecutor<'e>,
    learner_id: &str,
    exercise_ids: &[String],
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT latest.exercise_id
         FROM (
            SELECT DISTINCT ON (exercise_id) exercise_id, is_passed
            FROM submissions
            WHERE learner_id = $1
              AND exercise_id = ANY($2)
              AND status IN ($3, $4)
            ORDER BY exercise_id, revision DESC
         ) latest
         WHERE latest.is_passed",
    )
    .bind(learner_id)
    .bind(exercise_ids)
    .bind(SubmissionStatus::Passed)
    .bind(SubmissionStatus::Failed)
    .fetch_all(executor)
    .await
}

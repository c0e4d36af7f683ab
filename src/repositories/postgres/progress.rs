use sqlx::PgExecutor;

use crate::db::models::{Enrollment, EnrollmentProgress, LessonProgress, UnitProgress};
use crate::db::types::ProgressStatus;

const LESSON_COLUMNS: &str = "id, enrollment_id, learner_id, lesson_id, percent, status, \
    content_viewed, video_watched, document_read, practice_completed, started_at, completed_at, \
    last_updated_at";

const UNIT_COLUMNS: &str = "id, enrollment_id, unit_id, percent, status, completed_lessons, \
    total_lessons, started_at, completed_at, last_updated_at";

pub(super) async fn find_enrollment<'e>(
    executor: impl PgExecutor<'e>,
    learner_id: &str,
    course_id: &str,
) -> Result<Option<Enrollment>, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(
        "SELECT id, learner_id, course_id
         FROM enrollments
         WHERE learner_id = $1 AND course_id = $2",
    )
    .bind(learner_id)
    .bind(course_id)
    .fetch_optional(executor)
    .await
}

pub(super) async fn find_lesson_by_id<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
) -> Result<Option<LessonProgress>, sqlx::Error> {
    sqlx::query_as::<_, LessonProgress>(&format!(
        "SELECT {LESSON_COLUMNS} FROM lesson_progress WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(super) async fn find_lesson<'e>(
    executor: impl PgExecutor<'e>,
    enrollment_id: &str,
    lesson_id: &str,
) -> Result<Option<LessonProgress>, sqlx::Error> {
    sqlx::query_as::<_, LessonProgress>(&format!(
        "SELECT {LESSON_COLUMNS}
         FROM lesson_progress
         WHERE enrollment_id = $1 AND lesson_id = $2
         FOR UPDATE"
    ))
    .bind(enrollment_id)
    .bind(lesson_id)
    .fetch_optional(executor)
    .await
}

pub(super) async fn upsert_lesson<'e>(
    executor: impl PgExecutor<'e>,
    progress: &LessonProgress,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO lesson_progress ({LESSON_COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
         ON CONFLICT (id) DO UPDATE
         SET percent = EXCLUDED.percent,
             status = EXCLUDED.status,
             content_viewed = EXCLUDED.content_viewed,
             video_watched = EXCLUDED.video_watched,
             document_read = EXCLUDED.document_read,
             practice_completed = EXCLUDED.practice_completed,
             started_at = EXCLUDED.started_at,
             completed_at = EXCLUDED.completed_at,
             last_updated_at = EXCLUDED.last_updated_at"
    ))
    .bind(&progress.id)
    .bind(&progress.enrollment_id)
    .bind(&progress.learner_id)
    .bind(&progress.lesson_id)
    .bind(progress.percent)
    .bind(progress.status)
    .bind(progress.content_viewed)
    .bind(progress.video_watched)
    .bind(progress.document_read)
    .bind(progress.practice_completed)
    .bind(progress.started_at)
    .bind(progress.completed_at)
    .bind(progress.last_updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub(super) async fn lesson_statuses<'e>(
    executor: impl PgExecutor<'e>,
    enrollment_id: &str,
    lesson_ids: &[String],
) -> Result<Vec<(String, ProgressStatus)>, sqlx::Error> {
    sqlx::query_as::<_, (String, ProgressStatus)>(
        "SELECT lesson_id, status
         FROM lesson_progress
         WHERE enrollment_id = $1 AND lesson_id = ANY($2)",
    )
    .bind(enrollment_id)
    .bind(lesson_ids)
    .fetch_all(executor)
    .await
}

pub(super) async fn find_unit<'e>(
    executor: impl PgExecutor<'e>,
    enrollment_id: &str,
    unit_id: &str,
) -> Result<Option<UnitProgress>, sqlx::Error> {
    sqlx::query_as::<_, UnitProgress>(&format!(
        "SELECT {UNIT_COLUMNS}
         FROM unit_progress
         WHERE enrollment_id = $1 AND unit_id = $2
         FOR UPDATE"
    ))
    .bind(enrollment_id)
    .bind(unit_id)
    .fetch_optional(executor)
    .await
}

pub(super) async fn upsert_unit<'e>(
    executor: impl PgExecutor<'e>,
    progress: &UnitProgress,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO unit_progress ({UNIT_COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         ON CONFLICT (id) DO UPDATE
         SET percent = EXCLUDED.percent,
             status = EXCLUDED.status,
             completed_lessons = EXCLUDED.completed_lessons,
             total_lessons = EXCLUDED.total_lessons,
             started_at = EXCLUDED.started_at,
             completed_at = EXCLUDED.completed_at,
             last_updated_at = EXCLUDED.last_updated_at"
    ))
    .bind(&progress.id)
    .bind(&progress.enrollment_id)
    .bind(&progress.unit_id)
    .bind(progress.percent)
    .bind(progress.status)
    .bind(progress.completed_lessons)
    .bind(progress.total_lessons)
    .bind(progress.started_at)
    .bind(progress.completed_at)
    .bind(progress.last_updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub(super) async fn unit_statuses<'e>(
    executor: impl PgExecutor<'e>,
    enrollment_id: &str,
    unit_ids: &[String],
) -> Result<Vec<(String, ProgressStatus)>, sqlx::Error> {
    sqlx::query_as::<_, (String, ProgressStatus)>(
        "SELECT unit_id, status
         FROM unit_progress
         WHERE enrollment_id = $1 AND unit_id = ANY($2)",
    )
    .bind(enrollment_id)
    .bind(unit_ids)
    .fetch_all(executor)
    .await
}

pub(super) async fn find_enrollment_progress<'e>(
    executor: impl PgExecutor<'e>,
    enrollment_id: &str,
) -> Result<Option<EnrollmentProgress>, sqlx::Error> {
    sqlx::query_as::<_, EnrollmentProgress>(
        "SELECT id AS enrollment_id, learner_id, course_id, percent, status, completed_units,
                total_units, completed_lessons, total_lessons, started_at, completed_at,
                last_updated_at
         FROM enrollments
         WHERE id = $1
         FOR UPDATE",
    )
    .bind(enrollment_id)
    .fetch_optional(executor)
    .await
}

pub(super) async fn update_enrollment_progress<'e>(
    executor: impl PgExecutor<'e>,
    progress: &EnrollmentProgress,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE enrollments
         SET percent = $1,
             status = $2,
             completed_units = $3,
             total_units = $4,
             completed_lessons = $5,
             total_lessons = $6,
             started_at = $7,
             completed_at = $8,
             last_updated_at = $9
         WHERE id = $10",
    )
    .bind(progress.percent)
    .bind(progress.status)
    .bind(progress.completed_units)
    .bind(progress.total_units)
    .bind(progress.completed_lessons)
    .bind(progress.total_lessons)
    .bind(progress.started_at)
    .bind(progress.completed_at)
    .bind(progress.last_updated_at)
    .bind(&progress.enrollment_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

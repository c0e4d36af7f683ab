use sqlx::{FromRow, PgExecutor};

#[derive(Debug, FromRow)]
pub(super) struct LessonRow {
    pub(super) id: String,
    pub(super) unit_id: String,
    pub(super) course_id: String,
    pub(super) has_content: bool,
    pub(super) has_video: bool,
    pub(super) has_document: bool,
}

pub(super) async fn lesson<'e>(
    executor: impl PgExecutor<'e>,
    lesson_id: &str,
) -> Result<Option<LessonRow>, sqlx::Error> {
    sqlx::query_as::<_, LessonRow>(
        "SELECT id,
                unit_id,
                course_id,
                COALESCE(BTRIM(content_body), '') <> '' AS has_content,
                COALESCE(BTRIM(video_url), '') <> '' AS has_video,
                COALESCE(BTRIM(document_url), '') <> '' AS has_document
         FROM lessons
         WHERE id = $1",
    )
    .bind(lesson_id)
    .fetch_optional(executor)
    .await
}

pub(super) async fn lesson_exercise_ids<'e>(
    executor: impl PgExecutor<'e>,
    lesson_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT id FROM exercises WHERE lesson_id = $1 ORDER BY id")
        .bind(lesson_id)
        .fetch_all(executor)
        .await
}

pub(super) async fn unit_course<'e>(
    executor: impl PgExecutor<'e>,
    unit_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT course_id FROM units WHERE id = $1")
        .bind(unit_id)
        .fetch_optional(executor)
        .await
}

pub(super) async fn unit_lesson_ids<'e>(
    executor: impl PgExecutor<'e>,
    unit_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT id FROM lessons WHERE unit_id = $1 ORDER BY order_index, id",
    )
    .bind(unit_id)
    .fetch_all(executor)
    .await
}

pub(super) async fn course_exists<'e>(
    executor: impl PgExecutor<'e>,
    course_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM courses WHERE id = $1)")
        .bind(course_id)
        .fetch_one(executor)
        .await
}

pub(super) async fn course_teacher<'e>(
    executor: impl PgExecutor<'e>,
    course_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<String>>("SELECT teacher_id FROM courses WHERE id = $1")
        .bind(course_id)
        .fetch_optional(executor)
        .await
        .map(Option::flatten)
}

pub(super) async fn course_unit_ids<'e>(
    executor: impl PgExecutor<'e>,
    course_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT id FROM units WHERE course_id = $1 ORDER BY order_index, id",
    )
    .bind(course_id)
    .fetch_all(executor)
    .await
}

pub(super) async fn course_lesson_ids<'e>(
    executor: impl PgExecutor<'e>,
    course_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT id FROM lessons WHERE course_id = $1 ORDER BY order_index, id",
    )
    .bind(course_id)
    .fetch_all(executor)
    .await
}

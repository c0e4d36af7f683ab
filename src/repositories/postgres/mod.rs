//! PostgreSQL-backed store. Every write path runs inside `PgGradingTx` and
//! row locks (`FOR UPDATE`) serialize concurrent transitions on one submission.

mod assignments;
mod outlines;
mod progress;
mod submissions;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use time::PrimitiveDateTime;

use crate::db::models::{
    AssignmentQueueRow, CourseOutline, Enrollment, EnrollmentProgress, Exercise,
    GradingAssignment, LessonOutline, LessonProgress, Submission, UnitOutline, UnitProgress,
};
use crate::db::types::ProgressStatus;

use super::{AssignmentFilter, GradingStore, GradingTx, StoreError};

const EXERCISE_COLUMNS: &str = "id, course_id, lesson_id, exercise_type, language_code, prompt, \
    reference_text, expected_answer, image_urls, max_score, pass_score, ai_weight, teacher_weight";

async fn find_exercise<'e>(
    executor: impl PgExecutor<'e>,
    exercise_id: &str,
) -> Result<Option<Exercise>, sqlx::Error> {
    sqlx::query_as::<_, Exercise>(&format!(
        "SELECT {EXERCISE_COLUMNS} FROM exercises WHERE id = $1"
    ))
    .bind(exercise_id)
    .fetch_optional(executor)
    .await
}

#[derive(Clone)]
pub(crate) struct PgGradingStore {
    pool: PgPool,
}

impl PgGradingStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GradingStore for PgGradingStore {
    async fn begin(&self) -> Result<Box<dyn GradingTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgGradingTx { tx }))
    }

    async fn find_submission(&self, submission_id: &str) -> Result<Option<Submission>, StoreError> {
        Ok(submissions::find_by_id(&self.pool, submission_id).await?)
    }

    async fn find_exercise(&self, exercise_id: &str) -> Result<Option<Exercise>, StoreError> {
        Ok(find_exercise(&self.pool, exercise_id).await?)
    }

    async fn list_assignments(
        &self,
        submission_id: &str,
    ) -> Result<Vec<GradingAssignment>, StoreError> {
        Ok(assignments::list_by_submission(&self.pool, submission_id).await?)
    }

    async fn list_teacher_assignments(
        &self,
        teacher_id: &str,
        filter: &AssignmentFilter,
        now: PrimitiveDateTime,
    ) -> Result<(Vec<AssignmentQueueRow>, i64), StoreError> {
        let rows = assignments::list_for_teacher(&self.pool, teacher_id, filter, now).await?;
        let total = assignments::count_for_teacher(&self.pool, teacher_id, filter, now).await?;
        Ok((rows, total))
    }

    async fn claim_stale_pending(
        &self,
        stale_before: PrimitiveDateTime,
        now: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<String>, StoreError> {
        Ok(submissions::claim_stale_pending(&self.pool, stale_before, now, limit).await?)
    }

    async fn count_overdue_assignments(&self, now: PrimitiveDateTime) -> Result<i64, StoreError> {
        Ok(assignments::count_overdue(&self.pool, now).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub(crate) struct PgGradingTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl GradingTx for PgGradingTx {
    async fn lock_submission(
        &mut self,
        submission_id: &str,
    ) -> Result<Option<Submission>, StoreError> {
        Ok(submissions::lock_by_id(&mut *self.tx, submission_id).await?)
    }

    async fn latest_submission_for(
        &mut self,
        learner_id: &str,
        exercise_id: &str,
    ) -> Result<Option<Submission>, StoreError> {
        Ok(submissions::latest_for(&mut *self.tx, learner_id, exercise_id).await?)
    }

    async fn insert_submission(&mut self, submission: &Submission) -> Result<(), StoreError> {
        Ok(submissions::insert(&mut *self.tx, submission).await?)
    }

    async fn update_submission(&mut self, submission: &Submission) -> Result<(), StoreError> {
        let updated = submissions::update(&mut *self.tx, submission).await?;
        if updated == 0 {
            return Err(StoreError::Integrity(format!(
                "submission {} vanished during update",
                submission.id
            )));
        }
        Ok(())
    }

    async fn find_exercise(&mut self, exercise_id: &str) -> Result<Option<Exercise>, StoreError> {
        Ok(find_exercise(&mut *self.tx, exercise_id).await?)
    }

    async fn course_teacher(&mut self, course_id: &str) -> Result<Option<String>, StoreError> {
        Ok(outlines::course_teacher(&mut *self.tx, course_id).await?)
    }

    async fn list_assignments(
        &mut self,
        submission_id: &str,
    ) -> Result<Vec<GradingAssignment>, StoreError> {
        Ok(assignments::list_by_submission(&mut *self.tx, submission_id).await?)
    }

    async fn find_assignment(
        &mut self,
        assignment_id: &str,
    ) -> Result<Option<GradingAssignment>, StoreError> {
        Ok(assignments::find_by_id(&mut *self.tx, assignment_id).await?)
    }

    async fn save_assignment(&mut self, assignment: &GradingAssignment) -> Result<(), StoreError> {
        Ok(assignments::upsert(&mut *self.tx, assignment).await?)
    }

    async fn approve_earnings(
        &mut self,
        assignment_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<u64, StoreError> {
        Ok(assignments::approve_earnings(&mut *self.tx, assignment_id, now).await?)
    }

    async fn find_enrollment(
        &mut self,
        learner_id: &str,
        course_id: &str,
    ) -> Result<Option<Enrollment>, StoreError> {
        Ok(progress::find_enrollment(&mut *self.tx, learner_id, course_id).await?)
    }

    async fn lesson_outline(
        &mut self,
        lesson_id: &str,
    ) -> Result<Option<LessonOutline>, StoreError> {
        let Some(row) = outlines::lesson(&mut *self.tx, lesson_id).await? else {
            return Ok(None);
        };
        let exercise_ids = outlines::lesson_exercise_ids(&mut *self.tx, lesson_id).await?;
        Ok(Some(LessonOutline {
            lesson_id: row.id,
            unit_id: row.unit_id,
            course_id: row.course_id,
            has_content: row.has_content,
            has_video: row.has_video,
            has_document: row.has_document,
            exercise_ids,
        }))
    }

    async fn unit_outline(&mut self, unit_id: &str) -> Result<Option<UnitOutline>, StoreError> {
        let Some(course_id) = outlines::unit_course(&mut *self.tx, unit_id).await? else {
            return Ok(None);
        };
        let lesson_ids = outlines::unit_lesson_ids(&mut *self.tx, unit_id).await?;
        Ok(Some(UnitOutline { unit_id: unit_id.to_string(), course_id, lesson_ids }))
    }

    async fn course_outline(
        &mut self,
        course_id: &str,
    ) -> Result<Option<CourseOutline>, StoreError> {
        if !outlines::course_exists(&mut *self.tx, course_id).await? {
            return Ok(None);
        }
        let unit_ids = outlines::course_unit_ids(&mut *self.tx, course_id).await?;
        let lesson_ids = outlines::course_lesson_ids(&mut *self.tx, course_id).await?;
        Ok(Some(CourseOutline { course_id: course_id.to_string(), unit_ids, lesson_ids }))
    }

    async fn find_lesson_progress(
        &mut self,
        lesson_progress_id: &str,
    ) -> Result<Option<LessonProgress>, StoreError> {
        Ok(progress::find_lesson_by_id(&mut *self.tx, lesson_progress_id).await?)
    }

    async fn find_lesson_progress_for(
        &mut self,
        enrollment_id: &str,
        lesson_id: &str,
    ) -> Result<Option<LessonProgress>, StoreError> {
        Ok(progress::find_lesson(&mut *self.tx, enrollment_id, lesson_id).await?)
    }

    async fn save_lesson_progress(&mut self, record: &LessonProgress) -> Result<(), StoreError> {
        Ok(progress::upsert_lesson(&mut *self.tx, record).await?)
    }

    async fn lesson_statuses(
        &mut self,
        enrollment_id: &str,
        lesson_ids: &[String],
    ) -> Result<HashMap<String, ProgressStatus>, StoreError> {
        let rows = progress::lesson_statuses(&mut *self.tx, enrollment_id, lesson_ids).await?;
        Ok(rows.into_iter().collect())
    }

    async fn find_unit_progress(
        &mut self,
        enrollment_id: &str,
        unit_id: &str,
    ) -> Result<Option<UnitProgress>, StoreError> {
        Ok(progress::find_unit(&mut *self.tx, enrollment_id, unit_id).await?)
    }

    async fn save_unit_progress(&mut self, record: &UnitProgress) -> Result<(), StoreError> {
        Ok(progress::upsert_unit(&mut *self.tx, record).await?)
    }

    async fn unit_statuses(
        &mut self,
        enrollment_id: &str,
        unit_ids: &[String],
    ) -> Result<HashMap<String, ProgressStatus>, StoreError> {
        let rows = progress::unit_statuses(&mut *self.tx, enrollment_id, unit_ids).await?;
        Ok(rows.into_iter().collect())
    }

    async fn find_enrollment_progress(
        &mut self,
        enrollment_id: &str,
    ) -> Result<Option<EnrollmentProgress>, StoreError> {
        Ok(progress::find_enrollment_progress(&mut *self.tx, enrollment_id).await?)
    }

    async fn save_enrollment_progress(
        &mut self,
        record: &EnrollmentProgress,
    ) -> Result<(), StoreError> {
        let updated = progress::update_enrollment_progress(&mut *self.tx, record).await?;
        if updated == 0 {
            return Err(StoreError::Integrity(format!(
                "enrollment {} not found",
                record.enrollment_id
            )));
        }
        Ok(())
    }

    async fn passed_exercises(
        &mut self,
        learner_id: &str,
        exercise_ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        if exercise_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let passed = submissions::passed_exercises(&mut *self.tx, learner_id, exercise_ids).await?;
        Ok(passed.into_iter().collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

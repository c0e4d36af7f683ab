//! Entity persistence behind the grading pipeline.
//!
//! `GradingStore` serves plain reads and opens transactions. Every grading
//! transition runs inside one `GradingTx`: the submission row is locked
//! first, the state machine, score blending and progress cascade all write
//! through the same transaction, and nothing is visible until `commit`.
//! Dropping a transaction without committing rolls it back.

#[cfg(test)]
pub(crate) mod memory;
pub(crate) mod postgres;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{
    AssignmentQueueRow, CourseOutline, Enrollment, EnrollmentProgress, Exercise,
    GradingAssignment, LessonOutline, LessonProgress, Submission, UnitOutline, UnitProgress,
};
use crate::db::types::{AssignmentStatus, ProgressStatus};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("integrity violation: {0}")]
    Integrity(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AssignmentFilter {
    #[serde(default)]
    pub(crate) status: Option<AssignmentStatus>,
    #[serde(default)]
    pub(crate) overdue_only: bool,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    pub(crate) limit: i64,
}

#[async_trait]
pub(crate) trait GradingStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn GradingTx>, StoreError>;

    async fn find_submission(&self, submission_id: &str) -> Result<Option<Submission>, StoreError>;

    async fn find_exercise(&self, exercise_id: &str) -> Result<Option<Exercise>, StoreError>;

    async fn list_assignments(
        &self,
        submission_id: &str,
    ) -> Result<Vec<GradingAssignment>, StoreError>;

    async fn list_teacher_assignments(
        &self,
        teacher_id: &str,
        filter: &AssignmentFilter,
        now: PrimitiveDateTime,
    ) -> Result<(Vec<AssignmentQueueRow>, i64), StoreError>;

    /// Marks up to `limit` submissions still pending AI review whose run
    /// started (or, never started, whose upload happened) before
    /// `stale_before` as started at `now`, and returns their ids. Rows locked
    /// by another claimer are skipped.
    async fn claim_stale_pending(
        &self,
        stale_before: PrimitiveDateTime,
        now: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<String>, StoreError>;

    async fn count_overdue_assignments(&self, now: PrimitiveDateTime) -> Result<i64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub(crate) trait GradingTx: Send {
    /// Loads the submission and holds its row lock until commit or rollback.
    async fn lock_submission(
        &mut self,
        submission_id: &str,
    ) -> Result<Option<Submission>, StoreError>;

    async fn latest_submission_for(
        &mut self,
        learner_id: &str,
        exercise_id: &str,
    ) -> Result<Option<Submission>, StoreError>;

    async fn insert_submission(&mut self, submission: &Submission) -> Result<(), StoreError>;

    async fn update_submission(&mut self, submission: &Submission) -> Result<(), StoreError>;

    async fn find_exercise(&mut self, exercise_id: &str) -> Result<Option<Exercise>, StoreError>;

    async fn course_teacher(&mut self, course_id: &str) -> Result<Option<String>, StoreError>;

    async fn list_assignments(
        &mut self,
        submission_id: &str,
    ) -> Result<Vec<GradingAssignment>, StoreError>;

    async fn find_assignment(
        &mut self,
        assignment_id: &str,
    ) -> Result<Option<GradingAssignment>, StoreError>;

    async fn save_assignment(&mut self, assignment: &GradingAssignment) -> Result<(), StoreError>;

    /// Moves earnings allocations tied to the assignment to approved and
    /// returns how many rows changed.
    async fn approve_earnings(
        &mut self,
        assignment_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<u64, StoreError>;

    async fn find_enrollment(
        &mut self,
        learner_id: &str,
        course_id: &str,
    ) -> Result<Option<Enrollment>, StoreError>;

    async fn lesson_outline(&mut self, lesson_id: &str)
        -> Result<Option<LessonOutline>, StoreError>;

    async fn unit_outline(&mut self, unit_id: &str) -> Result<Option<UnitOutline>, StoreError>;

    async fn course_outline(&mut self, course_id: &str)
        -> Result<Option<CourseOutline>, StoreError>;

    async fn find_lesson_progress(
        &mut self,
        lesson_progress_id: &str,
    ) -> Result<Option<LessonProgress>, StoreError>;

    async fn find_lesson_progress_for(
        &mut self,
        enrollment_id: &str,
        lesson_id: &str,
    ) -> Result<Option<LessonProgress>, StoreError>;

    async fn save_lesson_progress(&mut self, progress: &LessonProgress) -> Result<(), StoreError>;

    async fn lesson_statuses(
        &mut self,
        enrollment_id: &str,
        lesson_ids: &[String],
    ) -> Result<HashMap<String, ProgressStatus>, StoreError>;

    async fn find_unit_progress(
        &mut self,
        enrollment_id: &str,
        unit_id: &str,
    ) -> Result<Option<UnitProgress>, StoreError>;

    async fn save_unit_progress(&mut self, progress: &UnitProgress) -> Result<(), StoreError>;

    async fn unit_statuses(
        &mut self,
        enrollment_id: &str,
        unit_ids: &[String],
    ) -> Result<HashMap<String, ProgressStatus>, StoreError>;

    async fn find_enrollment_progress(
        &mut self,
        enrollment_id: &str,
    ) -> Result<Option<EnrollmentProgress>, StoreError>;

    async fn save_enrollment_progress(
        &mut self,
        progress: &EnrollmentProgress,
    ) -> Result<(), StoreError>;

    /// Exercises whose most recent finalized submission by the learner passed.
    async fn passed_exercises(
        &mut self,
        learner_id: &str,
        exercise_ids: &[String],
    ) -> Result<HashSet<String>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

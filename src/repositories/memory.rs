//! In-process store used by the pipeline tests. Transactions take an owned
//! lock on the whole state and work on a staged copy that replaces the
//! shared state on commit, so concurrent transitions serialize the same way
//! row locks serialize them in Postgres.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use time::PrimitiveDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::models::{
    AssignmentQueueRow, CourseOutline, Enrollment, EnrollmentProgress, Exercise,
    GradingAssignment, LessonOutline, LessonProgress, Submission, UnitOutline, UnitProgress,
};
use crate::db::types::{AssignmentStatus, EarningStatus, ProgressStatus, SubmissionStatus};

use super::{AssignmentFilter, GradingStore, GradingTx, StoreError};

#[derive(Debug, Clone)]
pub(crate) struct Earning {
    pub(crate) assignment_id: String,
    pub(crate) status: EarningStatus,
    pub(crate) approved_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryState {
    pub(crate) course_teachers: HashMap<String, Option<String>>,
    pub(crate) units: Vec<UnitOutline>,
    pub(crate) lessons: Vec<LessonOutline>,
    pub(crate) exercises: HashMap<String, Exercise>,
    pub(crate) enrollments: HashMap<String, EnrollmentProgress>,
    pub(crate) submissions: HashMap<String, Submission>,
    pub(crate) assignments: HashMap<String, GradingAssignment>,
    pub(crate) earnings: Vec<Earning>,
    pub(crate) lesson_progress: HashMap<String, LessonProgress>,
    pub(crate) unit_progress: HashMap<String, UnitProgress>,
}

impl MemoryState {
    fn assignments_for(&self, submission_id: &str) -> Vec<GradingAssignment> {
        let mut rows: Vec<GradingAssignment> = self
            .assignments
            .values()
            .filter(|assignment| assignment.submission_id == submission_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rows
    }

    fn check_single_open_assignment(&self) -> Result<(), StoreError> {
        let mut open = HashSet::new();
        for assignment in self.assignments.values().filter(|a| a.status.is_open()) {
            if !open.insert(assignment.submission_id.as_str()) {
                return Err(StoreError::Integrity(format!(
                    "submission {} has more than one open assignment",
                    assignment.submission_id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    pub(crate) async fn update(&self, apply: impl FnOnce(&mut MemoryState)) {
        apply(&mut *self.state.lock().await);
    }

    pub(crate) async fn seed_course(&self, course_id: &str, teacher_id: Option<&str>) {
        self.state
            .lock()
            .await
            .course_teachers
            .insert(course_id.to_string(), teacher_id.map(str::to_string));
    }

    pub(crate) async fn seed_unit(&self, course_id: &str, unit_id: &str) {
        self.state.lock().await.units.push(UnitOutline {
            unit_id: unit_id.to_string(),
            course_id: course_id.to_string(),
            lesson_ids: Vec::new(),
        });
    }

    /// Registers the lesson under its unit; `exercise_ids` is filled by `seed_exercise`.
    pub(crate) async fn seed_lesson(&self, lesson: LessonOutline) {
        let mut state = self.state.lock().await;
        if let Some(unit) = state.units.iter_mut().find(|unit| unit.unit_id == lesson.unit_id) {
            unit.lesson_ids.push(lesson.lesson_id.clone());
        }
        state.lessons.push(lesson);
    }

    pub(crate) async fn seed_exercise(&self, exercise: Exercise) {
        let mut state = self.state.lock().await;
        if let Some(lesson_id) = exercise.lesson_id.as_deref() {
            if let Some(lesson) = state.lessons.iter_mut().find(|l| l.lesson_id == lesson_id) {
                lesson.exercise_ids.push(exercise.id.clone());
            }
        }
        state.exercises.insert(exercise.id.clone(), exercise);
    }

    pub(crate) async fn seed_enrollment(
        &self,
        enrollment_id: &str,
        learner_id: &str,
        course_id: &str,
        now: PrimitiveDateTime,
    ) {
        self.state.lock().await.enrollments.insert(
            enrollment_id.to_string(),
            EnrollmentProgress {
                enrollment_id: enrollment_id.to_string(),
                learner_id: learner_id.to_string(),
                course_id: course_id.to_string(),
                percent: 0.0,
                status: ProgressStatus::NotStarted,
                completed_units: 0,
                total_units: 0,
                completed_lessons: 0,
                total_lessons: 0,
                started_at: None,
                completed_at: None,
                last_updated_at: now,
            },
        );
    }

    pub(crate) async fn seed_earning(&self, assignment_id: &str) {
        self.state.lock().await.earnings.push(Earning {
            assignment_id: assignment_id.to_string(),
            status: EarningStatus::Pending,
            approved_at: None,
        });
    }
}

#[async_trait]
impl GradingStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn GradingTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }

    async fn find_submission(&self, submission_id: &str) -> Result<Option<Submission>, StoreError> {
        Ok(self.state.lock().await.submissions.get(submission_id).cloned())
    }

    async fn find_exercise(&self, exercise_id: &str) -> Result<Option<Exercise>, StoreError> {
        Ok(self.state.lock().await.exercises.get(exercise_id).cloned())
    }

    async fn list_assignments(
        &self,
        submission_id: &str,
    ) -> Result<Vec<GradingAssignment>, StoreError> {
        Ok(self.state.lock().await.assignments_for(submission_id))
    }

    async fn list_teacher_assignments(
        &self,
        teacher_id: &str,
        filter: &AssignmentFilter,
        now: PrimitiveDateTime,
    ) -> Result<(Vec<AssignmentQueueRow>, i64), StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<AssignmentQueueRow> = state
            .assignments
            .values()
            .filter(|a| a.teacher_id.as_deref() == Some(teacher_id))
            .filter(|a| filter.status.map_or(true, |status| a.status == status))
            .filter(|a| !filter.overdue_only || a.is_overdue(now))
            .filter_map(|a| {
                let submission = state.submissions.get(&a.submission_id)?;
                Some(AssignmentQueueRow {
                    assignment: a.clone(),
                    learner_id: submission.learner_id.clone(),
                    exercise_id: submission.exercise_id.clone(),
                    submission_status: submission.status,
                    ai_score: submission.ai_score,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.assignment
                .deadline_at
                .cmp(&b.assignment.deadline_at)
                .then_with(|| a.assignment.id.cmp(&b.assignment.id))
        });
        let total = rows.len() as i64;
        let page = rows
            .into_iter()
            .skip(filter.skip.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn claim_stale_pending(
        &self,
        stale_before: PrimitiveDateTime,
        now: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<String>, StoreError> {
        let mut state = self.state.lock().await;
        let mut candidates: Vec<&mut Submission> = state
            .submissions
            .values_mut()
            .filter(|s| s.status == SubmissionStatus::PendingAiReview)
            .filter(|s| s.ai_started_at.unwrap_or(s.submitted_at) < stale_before)
            .collect();
        candidates.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(candidates
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|submission| {
                submission.ai_started_at = Some(now);
                submission.updated_at = now;
                submission.id.clone()
            })
            .collect())
    }

    async fn count_overdue_assignments(&self, now: PrimitiveDateTime) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.assignments.values().filter(|a| a.is_overdue(now)).count() as i64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub(crate) struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl GradingTx for MemoryTx {
    async fn lock_submission(
        &mut self,
        submission_id: &str,
    ) -> Result<Option<Submission>, StoreError> {
        Ok(self.staged.submissions.get(submission_id).cloned())
    }

    async fn latest_submission_for(
        &mut self,
        learner_id: &str,
        exercise_id: &str,
    ) -> Result<Option<Submission>, StoreError> {
        Ok(self
            .staged
            .submissions
            .values()
            .filter(|s| s.learner_id == learner_id && s.exercise_id == exercise_id)
            .max_by_key(|s| s.revision)
            .cloned())
    }

    async fn insert_submission(&mut self, submission: &Submission) -> Result<(), StoreError> {
        if self.staged.submissions.contains_key(&submission.id) {
            return Err(StoreError::Integrity(format!(
                "submission {} already exists",
                submission.id
            )));
        }
        self.staged.submissions.insert(submission.id.clone(), submission.clone());
        Ok(())
    }

    async fn update_submission(&mut self, submission: &Submission) -> Result<(), StoreError> {
        match self.staged.submissions.get_mut(&submission.id) {
            Some(existing) => {
                *existing = submission.clone();
                Ok(())
            }
            None => Err(StoreError::Integrity(format!(
                "submission {} vanished during update",
                submission.id
            ))),
        }
    }

    async fn find_exercise(&mut self, exercise_id: &str) -> Result<Option<Exercise>, StoreError> {
        Ok(self.staged.exercises.get(exercise_id).cloned())
    }

    async fn course_teacher(&mut self, course_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.staged.course_teachers.get(course_id).cloned().flatten())
    }

    async fn list_assignments(
        &mut self,
        submission_id: &str,
    ) -> Result<Vec<GradingAssignment>, StoreError> {
        Ok(self.staged.assignments_for(submission_id))
    }

    async fn find_assignment(
        &mut self,
        assignment_id: &str,
    ) -> Result<Option<GradingAssignment>, StoreError> {
        Ok(self.staged.assignments.get(assignment_id).cloned())
    }

    async fn save_assignment(&mut self, assignment: &GradingAssignment) -> Result<(), StoreError> {
        self.staged.assignments.insert(assignment.id.clone(), assignment.clone());
        self.staged.check_single_open_assignment()
    }

    async fn approve_earnings(
        &mut self,
        assignment_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<u64, StoreError> {
        let mut approved = 0;
        for earning in self
            .staged
            .earnings
            .iter_mut()
            .filter(|e| e.assignment_id == assignment_id && e.status == EarningStatus::Pending)
        {
            earning.status = EarningStatus::Approved;
            earning.approved_at = Some(now);
            approved += 1;
        }
        Ok(approved)
    }

    async fn find_enrollment(
        &mut self,
        learner_id: &str,
        course_id: &str,
    ) -> Result<Option<Enrollment>, StoreError> {
        Ok(self
            .staged
            .enrollments
            .values()
            .find(|e| e.learner_id == learner_id && e.course_id == course_id)
            .map(|e| Enrollment {
                id: e.enrollment_id.clone(),
                learner_id: e.learner_id.clone(),
                course_id: e.course_id.clone(),
            }))
    }

    async fn lesson_outline(
        &mut self,
        lesson_id: &str,
    ) -> Result<Option<LessonOutline>, StoreError> {
        Ok(self.staged.lessons.iter().find(|l| l.lesson_id == lesson_id).cloned())
    }

    async fn unit_outline(&mut self, unit_id: &str) -> Result<Option<UnitOutline>, StoreError> {
        Ok(self.staged.units.iter().find(|u| u.unit_id == unit_id).cloned())
    }

    async fn course_outline(
        &mut self,
        course_id: &str,
    ) -> Result<Option<CourseOutline>, StoreError> {
        if !self.staged.course_teachers.contains_key(course_id) {
            return Ok(None);
        }
        let unit_ids = self
            .staged
            .units
            .iter()
            .filter(|u| u.course_id == course_id)
            .map(|u| u.unit_id.clone())
            .collect();
        let lesson_ids = self
            .staged
            .lessons
            .iter()
            .filter(|l| l.course_id == course_id)
            .map(|l| l.lesson_id.clone())
            .collect();
        Ok(Some(CourseOutline { course_id: course_id.to_string(), unit_ids, lesson_ids }))
    }

    async fn find_lesson_progress(
        &mut self,
        lesson_progress_id: &str,
    ) -> Result<Option<LessonProgress>, StoreError> {
        Ok(self.staged.lesson_progress.get(lesson_progress_id).cloned())
    }

    async fn find_lesson_progress_for(
        &mut self,
        enrollment_id: &str,
        lesson_id: &str,
    ) -> Result<Option<LessonProgress>, StoreError> {
        Ok(self
            .staged
            .lesson_progress
            .values()
            .find(|p| p.enrollment_id == enrollment_id && p.lesson_id == lesson_id)
            .cloned())
    }

    async fn save_lesson_progress(&mut self, record: &LessonProgress) -> Result<(), StoreError> {
        self.staged.lesson_progress.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn lesson_statuses(
        &mut self,
        enrollment_id: &str,
        lesson_ids: &[String],
    ) -> Result<HashMap<String, ProgressStatus>, StoreError> {
        Ok(self
            .staged
            .lesson_progress
            .values()
            .filter(|p| p.enrollment_id == enrollment_id && lesson_ids.contains(&p.lesson_id))
            .map(|p| (p.lesson_id.clone(), p.status))
            .collect())
    }

    async fn find_unit_progress(
        &mut self,
        enrollment_id: &str,
        unit_id: &str,
    ) -> Result<Option<UnitProgress>, StoreError> {
        Ok(self
            .staged
            .unit_progress
            .values()
            .find(|p| p.enrollment_id == enrollment_id && p.unit_id == unit_id)
            .cloned())
    }

    async fn save_unit_progress(&mut self, record: &UnitProgress) -> Result<(), StoreError> {
        self.staged.unit_progress.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn unit_statuses(
        &mut self,
        enrollment_id: &str,
        unit_ids: &[String],
    ) -> Result<HashMap<String, ProgressStatus>, StoreError> {
        Ok(self
            .staged
            .unit_progress
            .values()
            .filter(|p| p.enrollment_id == enrollment_id && unit_ids.contains(&p.unit_id))
            .map(|p| (p.unit_id.clone(), p.status))
            .collect())
    }

    async fn find_enrollment_progress(
        &mut self,
        enrollment_id: &str,
    ) -> Result<Option<EnrollmentProgress>, StoreError> {
        Ok(self.staged.enrollments.get(enrollment_id).cloned())
    }

    async fn save_enrollment_progress(
        &mut self,
        record: &EnrollmentProgress,
    ) -> Result<(), StoreError> {
        match self.staged.enrollments.get_mut(&record.enrollment_id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::Integrity(format!(
                "enrollment {} not found",
                record.enrollment_id
            ))),
        }
    }

    async fn passed_exercises(
        &mut self,
        learner_id: &str,
        exercise_ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        let mut latest: HashMap<&str, &Submission> = HashMap::new();
        for submission in self.staged.submissions.values().filter(|s| {
            s.learner_id == learner_id
                && s.status.is_final()
                && exercise_ids.contains(&s.exercise_id)
        }) {
            let entry = latest.entry(submission.exercise_id.as_str()).or_insert(submission);
            if submission.revision > entry.revision {
                *entry = submission;
            }
        }
        Ok(latest
            .into_iter()
            .filter(|(_, submission)| submission.is_passed == Some(true))
            .map(|(exercise_id, _)| exercise_id.to_string())
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_now_utc;

    fn assignment(id: &str, submission_id: &str, status: AssignmentStatus) -> GradingAssignment {
        let now = primitive_now_utc();
        GradingAssignment {
            id: id.to_string(),
            submission_id: submission_id.to_string(),
            teacher_id: Some("teacher-1".to_string()),
            status,
            assigned_at: now,
            deadline_at: now,
            completed_at: None,
            score: None,
            feedback: None,
            revoked_by: None,
            revoked_at: None,
            revocation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn dropped_transaction_discards_staged_writes() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.save_assignment(&assignment("a-1", "s-1", AssignmentStatus::Assigned))
                .await
                .unwrap();
        }
        assert!(store.snapshot().await.assignments.is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.save_assignment(&assignment("a-1", "s-1", AssignmentStatus::Assigned))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.snapshot().await.assignments.len(), 1);
    }

    #[tokio::test]
    async fn second_open_assignment_is_rejected() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.save_assignment(&assignment("a-1", "s-1", AssignmentStatus::Assigned))
            .await
            .unwrap();
        let err = tx
            .save_assignment(&assignment("a-2", "s-1", AssignmentStatus::Pending))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }
}

//! Lesson → unit → enrollment progress.
//!
//! The percent and status functions are pure and read only the children's
//! stored state, so replaying events in any order converges on the same
//! values. `recompute_from_lesson` is the trigger side: it loads that state
//! through the caller's transaction and persists every level it touches.

use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::{Enrollment, EnrollmentProgress, LessonOutline, LessonProgress, UnitProgress};
use crate::db::types::ProgressStatus;
use crate::repositories::{GradingTx, StoreError};

const CONTENT_WEIGHT: f64 = 50.0;
const VIDEO_WEIGHT: f64 = 20.0;
const DOCUMENT_WEIGHT: f64 = 20.0;
const EXERCISE_WEIGHT: f64 = 30.0;
/// A lesson only reports 100 when every component it has is done.
const INCOMPLETE_CAP: f64 = 99.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ActivityKind {
    ContentViewed,
    VideoWatched,
    DocumentRead,
    PracticeCompleted,
}

impl ActivityKind {
    pub(crate) fn apply(self, progress: &mut LessonProgress) {
        match self {
            Self::ContentViewed => progress.content_viewed = true,
            Self::VideoWatched => progress.video_watched = true,
            Self::DocumentRead => progress.document_read = true,
            Self::PracticeCompleted => progress.practice_completed = true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LessonInputs {
    pub(crate) has_content: bool,
    pub(crate) has_video: bool,
    pub(crate) has_document: bool,
    pub(crate) content_viewed: bool,
    pub(crate) video_watched: bool,
    pub(crate) document_read: bool,
    pub(crate) passed_exercises: usize,
    pub(crate) total_exercises: usize,
}

impl LessonInputs {
    fn from_state(outline: &LessonOutline, progress: &LessonProgress, passed: usize) -> Self {
        Self {
            has_content: outline.has_content,
            has_video: outline.has_video,
            has_document: outline.has_document,
            content_viewed: progress.content_viewed,
            video_watched: progress.video_watched,
            document_read: progress.document_read,
            passed_exercises: passed.min(outline.exercise_ids.len()),
            total_exercises: outline.exercise_ids.len(),
        }
    }
}

pub(crate) fn lesson_percent(inputs: LessonInputs) -> (f64, ProgressStatus) {
    let flag = |done: bool| if done { 1.0 } else { 0.0 };
    let mut components: Vec<(f64, f64)> = Vec::with_capacity(4);
    if inputs.has_content {
        components.push((CONTENT_WEIGHT, flag(inputs.content_viewed)));
    }
    if inputs.has_video {
        components.push((VIDEO_WEIGHT, flag(inputs.video_watched)));
    }
    if inputs.has_document {
        components.push((DOCUMENT_WEIGHT, flag(inputs.document_read)));
    }
    if inputs.total_exercises > 0 {
        let ratio = inputs.passed_exercises as f64 / inputs.total_exercises as f64;
        components.push((EXERCISE_WEIGHT, ratio));
    }

    if components.is_empty() {
        return (0.0, ProgressStatus::NotStarted);
    }
    if components.iter().all(|(_, done)| *done >= 1.0) {
        return (100.0, ProgressStatus::Completed);
    }

    let mut earned: f64 = components.iter().map(|(weight, done)| weight * done).sum();
    if inputs.total_exercises == 0 {
        // The exercise share is spread over the components that exist.
        let available: f64 = components.iter().map(|(weight, _)| weight).sum();
        earned *= 100.0 / available;
    }
    let percent = round2(earned.min(INCOMPLETE_CAP));
    (percent, status_for(percent > 0.0, false))
}

/// `(percent, status)` for a parent whose children are `completed` of `total`.
pub(crate) fn rollup_percent(completed: usize, total: usize, any_started: bool) -> (f64, ProgressStatus) {
    if total == 0 {
        return (0.0, ProgressStatus::NotStarted);
    }
    let completed = completed.min(total);
    let percent = round2(100.0 * completed as f64 / total as f64);
    (percent, status_for(any_started || completed > 0, completed == total))
}

fn status_for(started: bool, complete: bool) -> ProgressStatus {
    match (started, complete) {
        (_, true) => ProgressStatus::Completed,
        (true, false) => ProgressStatus::InProgress,
        (false, false) => ProgressStatus::NotStarted,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Maintains `started_at`/`completed_at` for a status change.
fn stamp(
    status: ProgressStatus,
    started_at: &mut Option<PrimitiveDateTime>,
    completed_at: &mut Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) {
    if status != ProgressStatus::NotStarted && started_at.is_none() {
        *started_at = Some(now);
    }
    match status {
        ProgressStatus::Completed => {
            completed_at.get_or_insert(now);
        }
        _ => *completed_at = None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ProgressSnapshot {
    pub(crate) lesson: LessonProgress,
    pub(crate) unit: Option<UnitProgress>,
    pub(crate) enrollment: Option<EnrollmentProgress>,
}

/// Finds the learner's lesson record or creates an untouched one.
pub(crate) async fn ensure_lesson_progress(
    tx: &mut dyn GradingTx,
    enrollment: &Enrollment,
    lesson_id: &str,
    now: PrimitiveDateTime,
) -> Result<LessonProgress, StoreError> {
    if let Some(existing) = tx.find_lesson_progress_for(&enrollment.id, lesson_id).await? {
        return Ok(existing);
    }
    let progress = LessonProgress {
        id: Uuid::new_v4().to_string(),
        enrollment_id: enrollment.id.clone(),
        learner_id: enrollment.learner_id.clone(),
        lesson_id: lesson_id.to_string(),
        percent: 0.0,
        status: ProgressStatus::NotStarted,
        content_viewed: false,
        video_watched: false,
        document_read: false,
        practice_completed: false,
        started_at: None,
        completed_at: None,
        last_updated_at: now,
    };
    tx.save_lesson_progress(&progress).await?;
    Ok(progress)
}

/// Recomputes the lesson from its flags and exercise verdicts, then the
/// unit and enrollment when the lesson's status moved.
pub(crate) async fn recompute_from_lesson(
    tx: &mut dyn GradingTx,
    mut lesson: LessonProgress,
    now: PrimitiveDateTime,
) -> Result<ProgressSnapshot, StoreError> {
    let outline = tx
        .lesson_outline(&lesson.lesson_id)
        .await?
        .ok_or_else(|| StoreError::Integrity(format!("lesson {} not found", lesson.lesson_id)))?;
    let passed = tx.passed_exercises(&lesson.learner_id, &outline.exercise_ids).await?;

    let previous_status = lesson.status;
    let (percent, status) = lesson_percent(LessonInputs::from_state(&outline, &lesson, passed.len()));
    lesson.percent = percent;
    lesson.status = status;
    lesson.last_updated_at = now;
    stamp(status, &mut lesson.started_at, &mut lesson.completed_at, now);
    tx.save_lesson_progress(&lesson).await?;
    metrics::counter!("progress_cascades_total", "level" => "lesson").increment(1);

    let (unit, enrollment) = if status != previous_status {
        tracing::debug!(
            lesson_id = %lesson.lesson_id,
            from = ?previous_status,
            to = ?status,
            "Lesson status changed, cascading"
        );
        let unit = recompute_unit(tx, &lesson.enrollment_id, &outline.unit_id, now).await?;
        let enrollment = recompute_enrollment(tx, &lesson.enrollment_id, now).await?;
        (unit, enrollment)
    } else {
        (
            tx.find_unit_progress(&lesson.enrollment_id, &outline.unit_id).await?,
            tx.find_enrollment_progress(&lesson.enrollment_id).await?,
        )
    };

    Ok(ProgressSnapshot { lesson, unit, enrollment })
}

async fn recompute_unit(
    tx: &mut dyn GradingTx,
    enrollment_id: &str,
    unit_id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<UnitProgress>, StoreError> {
    let Some(outline) = tx.unit_outline(unit_id).await? else {
        return Ok(None);
    };
    let statuses = tx.lesson_statuses(enrollment_id, &outline.lesson_ids).await?;
    let completed = statuses.values().filter(|s| **s == ProgressStatus::Completed).count();
    let any_started = statuses.values().any(|s| *s != ProgressStatus::NotStarted);
    let (percent, status) = rollup_percent(completed, outline.lesson_ids.len(), any_started);

    let mut unit = match tx.find_unit_progress(enrollment_id, unit_id).await? {
        Some(existing) => existing,
        None => UnitProgress {
            id: Uuid::new_v4().to_string(),
            enrollment_id: enrollment_id.to_string(),
            unit_id: unit_id.to_string(),
            percent: 0.0,
            status: ProgressStatus::NotStarted,
            completed_lessons: 0,
            total_lessons: 0,
            started_at: None,
            completed_at: None,
            last_updated_at: now,
        },
    };
    unit.percent = percent;
    unit.status = status;
    unit.completed_lessons = completed as i32;
    unit.total_lessons = outline.lesson_ids.len() as i32;
    unit.last_updated_at = now;
    stamp(status, &mut unit.started_at, &mut unit.completed_at, now);
    tx.save_unit_progress(&unit).await?;
    metrics::counter!("progress_cascades_total", "level" => "unit").increment(1);
    Ok(Some(unit))
}

async fn recompute_enrollment(
    tx: &mut dyn GradingTx,
    enrollment_id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<EnrollmentProgress>, StoreError> {
    let Some(mut enrollment) = tx.find_enrollment_progress(enrollment_id).await? else {
        return Ok(None);
    };
    let Some(course) = tx.course_outline(&enrollment.course_id).await? else {
        return Ok(Some(enrollment));
    };

    let unit_statuses = tx.unit_statuses(enrollment_id, &course.unit_ids).await?;
    let lesson_statuses = tx.lesson_statuses(enrollment_id, &course.lesson_ids).await?;
    let completed_units =
        unit_statuses.values().filter(|s| **s == ProgressStatus::Completed).count();
    let completed_lessons =
        lesson_statuses.values().filter(|s| **s == ProgressStatus::Completed).count();
    let any_started = lesson_statuses.values().any(|s| *s != ProgressStatus::NotStarted);
    let (percent, status) = rollup_percent(completed_units, course.unit_ids.len(), any_started);

    enrollment.percent = percent;
    enrollment.status = status;
    enrollment.completed_units = completed_units as i32;
    enrollment.total_units = course.unit_ids.len() as i32;
    enrollment.completed_lessons = completed_lessons as i32;
    enrollment.total_lessons = course.lesson_ids.len() as i32;
    enrollment.last_updated_at = now;
    stamp(status, &mut enrollment.started_at, &mut enrollment.completed_at, now);
    tx.save_enrollment_progress(&enrollment).await?;
    metrics::counter!("progress_cascades_total", "level" => "enrollment").increment(1);

    if status == ProgressStatus::Completed {
        tracing::info!(enrollment_id = %enrollment_id, "Enrollment completed");
    }
    Ok(Some(enrollment))
}

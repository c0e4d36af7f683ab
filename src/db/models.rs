use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AssignmentStatus, ExerciseType, ProgressStatus, SubmissionStatus};

/// Per-axis AI scores, each clamped to 0..=100. Axes a rubric does not
/// cover stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct AxisScores {
    pub(crate) pronunciation: Option<u32>,
    pub(crate) fluency: Option<u32>,
    pub(crate) coherence: Option<u32>,
    pub(crate) accuracy: Option<u32>,
    pub(crate) intonation: Option<u32>,
    pub(crate) grammar: Option<u32>,
    pub(crate) vocabulary: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) learner_id: String,
    pub(crate) exercise_id: String,
    pub(crate) course_id: String,
    pub(crate) lesson_progress_id: Option<String>,
    pub(crate) audio_key: String,
    pub(crate) audio_size_bytes: i64,
    pub(crate) audio_mime_type: String,
    pub(crate) transcript: Option<String>,
    pub(crate) ai_score: Option<f64>,
    pub(crate) ai_axes: Option<Json<AxisScores>>,
    pub(crate) ai_explanation: Option<String>,
    pub(crate) proficiency_band: Option<String>,
    pub(crate) ai_degraded: bool,
    pub(crate) teacher_id: Option<String>,
    pub(crate) teacher_score: Option<f64>,
    pub(crate) teacher_feedback: Option<String>,
    pub(crate) interim_score: Option<f64>,
    pub(crate) final_score: Option<f64>,
    pub(crate) is_passed: Option<bool>,
    pub(crate) status: SubmissionStatus,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) ai_started_at: Option<PrimitiveDateTime>,
    pub(crate) ai_completed_at: Option<PrimitiveDateTime>,
    pub(crate) reviewed_at: Option<PrimitiveDateTime>,
    pub(crate) previous_submission_id: Option<String>,
    pub(crate) revision: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exercise {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) lesson_id: Option<String>,
    pub(crate) exercise_type: ExerciseType,
    pub(crate) language_code: String,
    pub(crate) prompt: String,
    pub(crate) reference_text: Option<String>,
    pub(crate) expected_answer: Option<String>,
    pub(crate) image_urls: Json<Vec<String>>,
    pub(crate) max_score: f64,
    pub(crate) pass_score: f64,
    pub(crate) ai_weight: i32,
    pub(crate) teacher_weight: i32,
}

impl Exercise {
    /// Human review applies only when the type calls for it and the
    /// teacher actually carries weight in the final score.
    pub(crate) fn needs_teacher_review(&self) -> bool {
        self.exercise_type.requires_human_judgment() && self.teacher_weight > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct GradingAssignment {
    pub(crate) id: String,
    pub(crate) submission_id: String,
    pub(crate) teacher_id: Option<String>,
    pub(crate) status: AssignmentStatus,
    pub(crate) assigned_at: PrimitiveDateTime,
    pub(crate) deadline_at: PrimitiveDateTime,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) score: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) revoked_by: Option<String>,
    pub(crate) revoked_at: Option<PrimitiveDateTime>,
    pub(crate) revocation_reason: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl GradingAssignment {
    /// Overdue is evaluated on read; nothing resolves it automatically.
    pub(crate) fn is_overdue(&self, now: PrimitiveDateTime) -> bool {
        self.status == AssignmentStatus::Assigned && now > self.deadline_at
    }
}

/// Assignment joined with the submission fields a teacher's queue shows.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct AssignmentQueueRow {
    #[sqlx(flatten)]
    pub(crate) assignment: GradingAssignment,
    pub(crate) learner_id: String,
    pub(crate) exercise_id: String,
    pub(crate) submission_status: SubmissionStatus,
    pub(crate) ai_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Enrollment {
    pub(crate) id: String,
    pub(crate) learner_id: String,
    pub(crate) course_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct LessonProgress {
    pub(crate) id: String,
    pub(crate) enrollment_id: String,
    pub(crate) learner_id: String,
    pub(crate) lesson_id: String,
    pub(crate) percent: f64,
    pub(crate) status: ProgressStatus,
    pub(crate) content_viewed: bool,
    pub(crate) video_watched: bool,
    pub(crate) document_read: bool,
    pub(crate) practice_completed: bool,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) last_updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct UnitProgress {
    pub(crate) id: String,
    pub(crate) enrollment_id: String,
    pub(crate) unit_id: String,
    pub(crate) percent: f64,
    pub(crate) status: ProgressStatus,
    pub(crate) completed_lessons: i32,
    pub(crate) total_lessons: i32,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) last_updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct EnrollmentProgress {
    pub(crate) enrollment_id: String,
    pub(crate) learner_id: String,
    pub(crate) course_id: String,
    pub(crate) percent: f64,
    pub(crate) status: ProgressStatus,
    pub(crate) completed_units: i32,
    pub(crate) total_units: i32,
    pub(crate) completed_lessons: i32,
    pub(crate) total_lessons: i32,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) last_updated_at: PrimitiveDateTime,
}

/// Course-authoring facts about a lesson that progress depends on.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LessonOutline {
    pub(crate) lesson_id: String,
    pub(crate) unit_id: String,
    pub(crate) course_id: String,
    pub(crate) has_content: bool,
    pub(crate) has_video: bool,
    pub(crate) has_document: bool,
    pub(crate) exercise_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UnitOutline {
    pub(crate) unit_id: String,
    pub(crate) course_id: String,
    pub(crate) lesson_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CourseOutline {
    pub(crate) course_id: String,
    pub(crate) unit_ids: Vec<String>,
    pub(crate) lesson_ids: Vec<String>,
}

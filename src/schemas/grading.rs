use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{AssignmentQueueRow, AxisScores, GradingAssignment, Submission};
use crate::db::types::{AssignmentStatus, SubmissionStatus};
use crate::services::grading::GradingStatusView;

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionAcceptedResponse {
    pub(crate) id: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) revision: i32,
    pub(crate) previous_submission_id: Option<String>,
    pub(crate) submitted_at: String,
}

impl From<&Submission> for SubmissionAcceptedResponse {
    fn from(submission: &Submission) -> Self {
        Self {
            id: submission.id.clone(),
            status: submission.status,
            revision: submission.revision,
            previous_submission_id: submission.previous_submission_id.clone(),
            submitted_at: format_primitive(submission.submitted_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentResponse {
    pub(crate) id: String,
    pub(crate) submission_id: String,
    pub(crate) teacher_id: Option<String>,
    pub(crate) status: AssignmentStatus,
    pub(crate) assigned_at: String,
    pub(crate) deadline_at: String,
    pub(crate) completed_at: Option<String>,
    pub(crate) is_overdue: bool,
    pub(crate) revoked_by: Option<String>,
    pub(crate) revocation_reason: Option<String>,
}

impl AssignmentResponse {
    pub(crate) fn new(assignment: &GradingAssignment, is_overdue: bool) -> Self {
        Self {
            id: assignment.id.clone(),
            submission_id: assignment.submission_id.clone(),
            teacher_id: assignment.teacher_id.clone(),
            status: assignment.status,
            assigned_at: format_primitive(assignment.assigned_at),
            deadline_at: format_primitive(assignment.deadline_at),
            completed_at: assignment.completed_at.map(format_primitive),
            is_overdue,
            revoked_by: assignment.revoked_by.clone(),
            revocation_reason: assignment.revocation_reason.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GradingStatusResponse {
    pub(crate) submission_id: String,
    pub(crate) exercise_id: String,
    pub(crate) learner_id: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) transcript: Option<String>,
    pub(crate) ai_score: Option<f64>,
    pub(crate) ai_axes: Option<AxisScores>,
    pub(crate) ai_explanation: Option<String>,
    pub(crate) proficiency_band: Option<String>,
    pub(crate) ai_degraded: bool,
    pub(crate) teacher_score: Option<f64>,
    pub(crate) teacher_feedback: Option<String>,
    pub(crate) interim_score: Option<f64>,
    pub(crate) final_score: Option<f64>,
    pub(crate) is_passed: Option<bool>,
    pub(crate) revision: i32,
    pub(crate) previous_submission_id: Option<String>,
    pub(crate) submitted_at: String,
    pub(crate) ai_completed_at: Option<String>,
    pub(crate) reviewed_at: Option<String>,
    pub(crate) audio_url: Option<String>,
    pub(crate) assignment: Option<AssignmentResponse>,
}

impl From<GradingStatusView> for GradingStatusResponse {
    fn from(view: GradingStatusView) -> Self {
        let GradingStatusView { submission, assignment, assignment_overdue, audio_url } = view;
        Self {
            submission_id: submission.id,
            exercise_id: submission.exercise_id,
            learner_id: submission.learner_id,
            status: submission.status,
            transcript: submission.transcript,
            ai_score: submission.ai_score,
            ai_axes: submission.ai_axes.map(|axes| axes.0),
            ai_explanation: submission.ai_explanation,
            proficiency_band: submission.proficiency_band,
            ai_degraded: submission.ai_degraded,
            teacher_score: submission.teacher_score,
            teacher_feedback: submission.teacher_feedback,
            interim_score: submission.interim_score,
            final_score: submission.final_score,
            is_passed: submission.is_passed,
            revision: submission.revision,
            previous_submission_id: submission.previous_submission_id,
            submitted_at: format_primitive(submission.submitted_at),
            ai_completed_at: submission.ai_completed_at.map(format_primitive),
            reviewed_at: submission.reviewed_at.map(format_primitive),
            audio_url,
            assignment: assignment.map(|a| AssignmentResponse::new(&a, assignment_overdue)),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GradeResponse {
    pub(crate) submission_id: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) interim_score: Option<f64>,
    pub(crate) final_score: Option<f64>,
    pub(crate) is_passed: Option<bool>,
}

impl From<&Submission> for GradeResponse {
    fn from(submission: &Submission) -> Self {
        Self {
            submission_id: submission.id.clone(),
            status: submission.status,
            interim_score: submission.interim_score,
            final_score: submission.final_score,
            is_passed: submission.is_passed,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentQueueItem {
    #[serde(flatten)]
    pub(crate) assignment: AssignmentResponse,
    pub(crate) learner_id: String,
    pub(crate) exercise_id: String,
    pub(crate) submission_status: SubmissionStatus,
    pub(crate) ai_score: Option<f64>,
}

impl AssignmentQueueItem {
    pub(crate) fn new(row: &AssignmentQueueRow, is_overdue: bool) -> Self {
        Self {
            assignment: AssignmentResponse::new(&row.assignment, is_overdue),
            learner_id: row.learner_id.clone(),
            exercise_id: row.exercise_id.clone(),
            submission_status: row.submission_status,
            ai_score: row.ai_score,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TeacherScoreRequest {
    #[validate(range(min = 0.0, max = 100.0, message = "score must be between 0 and 100"))]
    pub(crate) score: f64,
    #[serde(default)]
    #[validate(length(max = 4000, message = "feedback must be at most 4000 characters"))]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ReassignRequest {
    #[validate(length(min = 1, message = "teacher_id is required"))]
    pub(crate) teacher_id: String,
    #[validate(length(min = 1, max = 500, message = "reason must be 1-500 characters"))]
    pub(crate) reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct RevokeRequest {
    #[validate(length(min = 1, max = 500, message = "reason must be 1-500 characters"))]
    pub(crate) reason: String,
}

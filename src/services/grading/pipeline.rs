//! Orchestrates one submission from upload to verdict.
//!
//! Provider calls never run inside a transaction. Every state change does:
//! the submission row is locked, the state machine picks the row, and the
//! blend, assignment bookkeeping and progress cascade commit together.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::types::Json;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::security::CallerRole;
use crate::core::time::{hours_after, primitive_now_utc};
use crate::db::models::{AssignmentQueueRow, Enrollment, Exercise, GradingAssignment, Submission};
use crate::db::types::{AssignmentStatus, SubmissionStatus};
use crate::repositories::{AssignmentFilter, GradingStore, GradingTx};
use crate::services::evaluation::{EvaluationGateway, EvaluationOutcome, PromptContext, ScoreReport};
use crate::services::notifications::{GradeVerdict, Notifier};
use crate::services::progress::{self, ActivityKind, ProgressSnapshot};
use crate::services::score_blend::{blend, validate_exercise, BlendOutcome, GradingMode};
use crate::services::storage::{audio_extension, audio_key, BlobStorage};
use crate::services::transcription::{AudioRef, TranscriptionGateway, TranscriptionOutcome};

use super::errors::GradingError;
use super::state_machine::{next, Effect, GradingEvent, GuardContext, Step, Target};

const SYSTEM_ACTOR: &str = "system";
const AI_FAILURE_REVOCATION: &str = "ai evaluation failed";

#[derive(Debug, Clone)]
pub(crate) struct AudioUpload {
    pub(crate) bytes: Vec<u8>,
    pub(crate) mime_type: String,
}

#[derive(Debug, Clone)]
pub(crate) struct PipelineLimits {
    pub(crate) review_window_hours: u64,
    pub(crate) max_audio_bytes: usize,
}

/// What a status request returns: the submission plus its current review slot.
#[derive(Debug, Clone)]
pub(crate) struct GradingStatusView {
    pub(crate) submission: Submission,
    pub(crate) assignment: Option<GradingAssignment>,
    pub(crate) assignment_overdue: bool,
    pub(crate) audio_url: Option<String>,
}

/// Data the table's effects consume; which fields are set depends on the event.
#[derive(Default)]
struct EffectInputs<'a> {
    transcript: Option<&'a str>,
    report: Option<(&'a ScoreReport, bool)>,
    failure_reason: Option<&'a str>,
    teacher: Option<TeacherInput<'a>>,
}

struct TeacherInput<'a> {
    teacher_id: &'a str,
    score: f64,
    feedback: Option<&'a str>,
    assignment: GradingAssignment,
}

enum AiResult {
    Evaluated { transcript: String, outcome: EvaluationOutcome },
    Failed { reason: String },
}

pub(crate) struct GradingPipeline {
    store: Arc<dyn GradingStore>,
    storage: Arc<dyn BlobStorage>,
    transcription: TranscriptionGateway,
    evaluation: EvaluationGateway,
    notifier: Arc<dyn Notifier>,
    limits: PipelineLimits,
}

impl GradingPipeline {
    pub(crate) fn new(
        store: Arc<dyn GradingStore>,
        storage: Arc<dyn BlobStorage>,
        transcription: TranscriptionGateway,
        evaluation: EvaluationGateway,
        notifier: Arc<dyn Notifier>,
        limits: PipelineLimits,
    ) -> Self {
        Self { store, storage, transcription, evaluation, notifier, limits }
    }

    /// Stores the recording and creates the submission (and its review
    /// assignment when the exercise needs a teacher). AI grading is not
    /// started here; see `spawn_ai_grading`.
    pub(crate) async fn submit_exercise(
        &self,
        learner_id: &str,
        exercise_id: &str,
        audio: AudioUpload,
    ) -> Result<Submission, GradingError> {
        let exercise = self
            .store
            .find_exercise(exercise_id)
            .await?
            .ok_or_else(|| GradingError::NotFound(format!("exercise {exercise_id}")))?;
        validate_exercise(&exercise).map_err(GradingError::Validation)?;

        if audio.bytes.is_empty() {
            return Err(GradingError::Validation("audio file is empty".to_string()));
        }
        if audio.bytes.len() > self.limits.max_audio_bytes {
            return Err(GradingError::Validation("audio file is too large".to_string()));
        }
        if audio_extension(&audio.mime_type).is_none() {
            return Err(GradingError::Validation(format!(
                "unsupported content type {}",
                audio.mime_type
            )));
        }

        // Refused submissions must not leave blobs behind. The same checks
        // repeat under the transaction below.
        let mut precheck = self.store.begin().await?;
        admission(precheck.as_mut(), learner_id, &exercise).await?;
        drop(precheck);

        let (key, _) = audio_key(learner_id, &audio.bytes, &audio.mime_type);
        let stored = self
            .storage
            .upload(&key, &audio.mime_type, audio.bytes)
            .await
            .map_err(GradingError::Storage)?;

        let now = primitive_now_utc();
        let mut tx = self.store.begin().await?;

        let (enrollment, previous) = admission(tx.as_mut(), learner_id, &exercise).await?;

        let lesson_progress_id = match exercise.lesson_id.as_deref() {
            Some(lesson_id) => {
                Some(progress::ensure_lesson_progress(tx.as_mut(), &enrollment, lesson_id, now).await?.id)
            }
            None => None,
        };

        let submission = Submission {
            id: Uuid::new_v4().to_string(),
            learner_id: learner_id.to_string(),
            exercise_id: exercise.id.clone(),
            course_id: exercise.course_id.clone(),
            lesson_progress_id,
            audio_key: stored.key,
            audio_size_bytes: stored.size_bytes,
            audio_mime_type: audio.mime_type,
            transcript: None,
            ai_score: None,
            ai_axes: None,
            ai_explanation: None,
            proficiency_band: None,
            ai_degraded: false,
            teacher_id: None,
            teacher_score: None,
            teacher_feedback: None,
            interim_score: None,
            final_score: None,
            is_passed: None,
            status: SubmissionStatus::PendingAiReview,
            submitted_at: now,
            ai_started_at: None,
            ai_completed_at: None,
            reviewed_at: None,
            previous_submission_id: previous.as_ref().map(|prev| prev.id.clone()),
            revision: previous.as_ref().map_or(1, |prev| prev.revision + 1),
            created_at: now,
            updated_at: now,
        };
        tx.insert_submission(&submission).await?;

        if exercise.needs_teacher_review() {
            let teacher_id = tx.course_teacher(&exercise.course_id).await?;
            let assignment = self.new_assignment(&submission.id, teacher_id, now);
            if assignment.teacher_id.is_none() {
                tracing::warn!(
                    submission_id = %submission.id,
                    course_id = %exercise.course_id,
                    "Course has no teacher; review assignment left pending"
                );
            }
            tx.save_assignment(&assignment).await?;
        }

        tx.commit().await?;

        tracing::info!(
            submission_id = %submission.id,
            learner_id = %learner_id,
            exercise_id = %exercise_id,
            revision = submission.revision,
            "Submission accepted"
        );
        Ok(submission)
    }

    pub(crate) fn spawn_ai_grading(self: &Arc<Self>, submission_id: String) {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = pipeline.run_ai_grading(&submission_id).await {
                tracing::error!(
                    submission_id = %submission_id,
                    error = %err,
                    "AI grading run failed"
                );
            }
        });
    }

    /// Transcribes, evaluates and applies the result. A submission that has
    /// already left `PendingAiReview` is returned unchanged.
    pub(crate) async fn run_ai_grading(&self, submission_id: &str) -> Result<Submission, GradingError> {
        let started = Instant::now();

        let mut tx = self.store.begin().await?;
        let mut submission = tx
            .lock_submission(submission_id)
            .await?
            .ok_or_else(|| GradingError::NotFound(format!("submission {submission_id}")))?;
        if submission.status != SubmissionStatus::PendingAiReview {
            return Ok(submission);
        }
        let exercise = load_exercise(tx.as_mut(), &submission.exercise_id).await?;
        let now = primitive_now_utc();
        submission.ai_started_at = Some(now);
        submission.updated_at = now;
        tx.update_submission(&submission).await?;
        tx.commit().await?;

        let ai = self.call_providers(&submission, &exercise).await;

        let mut tx = self.store.begin().await?;
        let mut submission = tx
            .lock_submission(submission_id)
            .await?
            .ok_or_else(|| GradingError::NotFound(format!("submission {submission_id}")))?;
        if submission.status != SubmissionStatus::PendingAiReview {
            tracing::info!(
                submission_id = %submission_id,
                status = submission.status.as_str(),
                "Submission resolved by a concurrent run, discarding AI result"
            );
            return Ok(submission);
        }

        let now = primitive_now_utc();
        let verdict = match &ai {
            AiResult::Evaluated { transcript, outcome } => {
                let inputs = EffectInputs {
                    transcript: Some(transcript),
                    report: Some((outcome.report(), outcome.is_degraded())),
                    ..EffectInputs::default()
                };
                let graded = next(submission.status, GradingEvent::AiCompleted, guard(&submission, &exercise))?;
                self.apply(tx.as_mut(), &mut submission, &exercise, graded, &inputs, now).await?;
                let resolved = next(submission.status, GradingEvent::Resolve, guard(&submission, &exercise))?;
                self.apply(tx.as_mut(), &mut submission, &exercise, resolved, &inputs, now).await?
            }
            AiResult::Failed { reason } => {
                let inputs = EffectInputs { failure_reason: Some(reason), ..EffectInputs::default() };
                let failed = next(submission.status, GradingEvent::AiFailed, guard(&submission, &exercise))?;
                self.apply(tx.as_mut(), &mut submission, &exercise, failed, &inputs, now).await?
            }
        };
        tx.commit().await?;

        metrics::counter!("grading_jobs_total", "status" => submission.status.as_str()).increment(1);
        metrics::histogram!("grading_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            submission_id = %submission_id,
            status = submission.status.as_str(),
            ai_score = submission.ai_score,
            degraded = submission.ai_degraded,
            "AI grading finished"
        );

        if let Some(verdict) = verdict {
            self.notify(&submission.learner_id, &verdict).await;
        }
        Ok(submission)
    }

    async fn call_providers(&self, submission: &Submission, exercise: &Exercise) -> AiResult {
        let audio = AudioRef {
            key: &submission.audio_key,
            size_bytes: submission.audio_size_bytes,
            mime_type: &submission.audio_mime_type,
        };
        match self.transcription.transcribe(audio, &exercise.language_code, &submission.id).await {
            TranscriptionOutcome::Transcribed { text, provider } => {
                tracing::debug!(submission_id = %submission.id, provider = %provider, "Transcribed");
                let context = PromptContext::for_exercise(exercise);
                let outcome = self.evaluation.evaluate(&context, &text, &submission.id).await;
                AiResult::Evaluated { transcript: text, outcome }
            }
            TranscriptionOutcome::Rejected { reason } | TranscriptionOutcome::Exhausted { reason } => {
                AiResult::Failed { reason }
            }
        }
    }

    pub(crate) async fn submit_teacher_score(
        &self,
        teacher_id: &str,
        submission_id: &str,
        score: f64,
        feedback: Option<String>,
    ) -> Result<Submission, GradingError> {
        if !score.is_finite() || !(0.0..=100.0).contains(&score) {
            return Err(GradingError::Validation("score must be between 0 and 100".to_string()));
        }

        let mut tx = self.store.begin().await?;
        let mut submission = tx
            .lock_submission(submission_id)
            .await?
            .ok_or_else(|| GradingError::NotFound(format!("submission {submission_id}")))?;
        if submission.status.is_final() {
            return Err(GradingError::Conflict("submission is already finalized".to_string()));
        }

        let assignment = tx
            .list_assignments(submission_id)
            .await?
            .into_iter()
            .find(|a| a.status == AssignmentStatus::Assigned && a.teacher_id.as_deref() == Some(teacher_id))
            .ok_or_else(|| {
                GradingError::Forbidden("no active assignment for this submission".to_string())
            })?;

        let exercise = load_exercise(tx.as_mut(), &submission.exercise_id).await?;
        let step = next(submission.status, GradingEvent::TeacherScored, guard(&submission, &exercise))?;
        let now = primitive_now_utc();
        let inputs = EffectInputs {
            teacher: Some(TeacherInput {
                teacher_id,
                score,
                feedback: feedback.as_deref(),
                assignment,
            }),
            ..EffectInputs::default()
        };
        let verdict = self.apply(tx.as_mut(), &mut submission, &exercise, step, &inputs, now).await?;
        tx.commit().await?;

        tracing::info!(
            submission_id = %submission_id,
            teacher_id = %teacher_id,
            status = submission.status.as_str(),
            "Teacher score recorded"
        );
        if let Some(verdict) = verdict {
            self.notify(&submission.learner_id, &verdict).await;
        }
        Ok(submission)
    }

    /// Revokes the open assignment and hands the review to `teacher_id`.
    /// On a finalized submission this reopens it for a fresh teacher score.
    pub(crate) async fn reassign(
        &self,
        manager_id: &str,
        submission_id: &str,
        teacher_id: &str,
        reason: &str,
    ) -> Result<GradingAssignment, GradingError> {
        let mut tx = self.store.begin().await?;
        let mut submission = tx
            .lock_submission(submission_id)
            .await?
            .ok_or_else(|| GradingError::NotFound(format!("submission {submission_id}")))?;
        let exercise = load_exercise(tx.as_mut(), &submission.exercise_id).await?;
        let step = next(submission.status, GradingEvent::Reassigned, guard(&submission, &exercise))?;
        let now = primitive_now_utc();

        for mut open in tx.list_assignments(submission_id).await?.into_iter().filter(|a| a.status.is_open()) {
            revoke(&mut open, manager_id, reason, now);
            tx.save_assignment(&open).await?;
        }
        let assignment = self.new_assignment(submission_id, Some(teacher_id.to_string()), now);
        tx.save_assignment(&assignment).await?;

        self.apply(tx.as_mut(), &mut submission, &exercise, step, &EffectInputs::default(), now).await?;
        tx.commit().await?;

        tracing::info!(
            submission_id = %submission_id,
            teacher_id = %teacher_id,
            manager_id = %manager_id,
            status = submission.status.as_str(),
            "Review reassigned"
        );
        Ok(assignment)
    }

    pub(crate) async fn revoke_assignment(
        &self,
        manager_id: &str,
        assignment_id: &str,
        reason: &str,
    ) -> Result<GradingAssignment, GradingError> {
        let mut tx = self.store.begin().await?;
        let submission_id = tx
            .find_assignment(assignment_id)
            .await?
            .ok_or_else(|| GradingError::NotFound(format!("assignment {assignment_id}")))?
            .submission_id;
        tx.lock_submission(&submission_id).await?;

        // Re-read under the submission lock.
        let mut assignment = tx
            .find_assignment(assignment_id)
            .await?
            .ok_or_else(|| GradingError::NotFound(format!("assignment {assignment_id}")))?;
        if !assignment.status.is_open() {
            return Err(GradingError::Conflict("assignment is no longer active".to_string()));
        }
        revoke(&mut assignment, manager_id, reason, primitive_now_utc());
        tx.save_assignment(&assignment).await?;
        tx.commit().await?;

        tracing::info!(
            assignment_id = %assignment_id,
            submission_id = %submission_id,
            manager_id = %manager_id,
            "Assignment revoked"
        );
        Ok(assignment)
    }

    pub(crate) async fn record_activity(
        &self,
        learner_id: &str,
        lesson_id: &str,
        kind: ActivityKind,
    ) -> Result<ProgressSnapshot, GradingError> {
        let now = primitive_now_utc();
        let mut tx = self.store.begin().await?;
        let outline = tx
            .lesson_outline(lesson_id)
            .await?
            .ok_or_else(|| GradingError::NotFound(format!("lesson {lesson_id}")))?;
        let enrollment = tx
            .find_enrollment(learner_id, &outline.course_id)
            .await?
            .ok_or_else(|| GradingError::Forbidden("learner is not enrolled in this course".into()))?;

        let mut lesson = progress::ensure_lesson_progress(tx.as_mut(), &enrollment, lesson_id, now).await?;
        kind.apply(&mut lesson);
        let snapshot = progress::recompute_from_lesson(tx.as_mut(), lesson, now).await?;
        tx.commit().await?;
        Ok(snapshot)
    }

    pub(crate) async fn grading_status(
        &self,
        caller_id: &str,
        role: CallerRole,
        submission_id: &str,
    ) -> Result<GradingStatusView, GradingError> {
        let submission = self
            .store
            .find_submission(submission_id)
            .await?
            .ok_or_else(|| GradingError::NotFound(format!("submission {submission_id}")))?;
        let assignments = self.store.list_assignments(submission_id).await?;

        let allowed = match role {
            CallerRole::Manager => true,
            CallerRole::Learner => submission.learner_id == caller_id,
            CallerRole::Teacher => {
                assignments.iter().any(|a| a.teacher_id.as_deref() == Some(caller_id))
            }
        };
        if !allowed {
            return Err(GradingError::Forbidden("not allowed to view this submission".to_string()));
        }

        let assignment = assignments
            .iter()
            .rev()
            .find(|a| a.status.is_open())
            .or_else(|| assignments.last())
            .cloned();
        let assignment_overdue =
            assignment.as_ref().is_some_and(|a| a.is_overdue(primitive_now_utc()));

        let audio_url = if role == CallerRole::Learner {
            None
        } else {
            match self.storage.playback_url(&submission.audio_key).await {
                Ok(url) => Some(url),
                Err(err) => {
                    tracing::warn!(submission_id = %submission_id, error = %err, "No playback URL");
                    None
                }
            }
        };

        Ok(GradingStatusView { submission, assignment, assignment_overdue, audio_url })
    }

    pub(crate) async fn teacher_assignments(
        &self,
        teacher_id: &str,
        filter: &AssignmentFilter,
    ) -> Result<(Vec<AssignmentQueueRow>, i64), GradingError> {
        let filter = AssignmentFilter {
            skip: filter.skip.max(0),
            limit: filter.limit.clamp(1, 100),
            ..filter.clone()
        };
        Ok(self.store.list_teacher_assignments(teacher_id, &filter, primitive_now_utc()).await?)
    }

    /// Re-runs AI grading for submissions stuck in `PendingAiReview` and
    /// returns how many were picked up.
    pub(crate) async fn recover_stale(
        &self,
        stale_after: Duration,
        batch_size: i64,
    ) -> Result<usize, GradingError> {
        let now = primitive_now_utc();
        let stale_before = now - stale_after;
        let claimed = self.store.claim_stale_pending(stale_before, now, batch_size).await?;
        if claimed.is_empty() {
            return Ok(0);
        }

        tracing::info!(count = claimed.len(), "Recovering stale submissions");
        for submission_id in &claimed {
            if let Err(err) = self.run_ai_grading(submission_id).await {
                tracing::error!(
                    submission_id = %submission_id,
                    error = %err,
                    "Stale submission recovery failed"
                );
            }
        }
        Ok(claimed.len())
    }

    /// Publishes the overdue count; overdue assignments are not resolved here.
    pub(crate) async fn report_overdue(&self) -> Result<i64, GradingError> {
        let overdue = self.store.count_overdue_assignments(primitive_now_utc()).await?;
        metrics::gauge!("grading_assignments_overdue").set(overdue as f64);
        if overdue > 0 {
            tracing::warn!(overdue, "Review assignments past their deadline");
        }
        Ok(overdue)
    }

    fn new_assignment(
        &self,
        submission_id: &str,
        teacher_id: Option<String>,
        now: PrimitiveDateTime,
    ) -> GradingAssignment {
        let status =
            if teacher_id.is_some() { AssignmentStatus::Assigned } else { AssignmentStatus::Pending };
        GradingAssignment {
            id: Uuid::new_v4().to_string(),
            submission_id: submission_id.to_string(),
            teacher_id,
            status,
            assigned_at: now,
            deadline_at: hours_after(now, self.limits.review_window_hours),
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

    /// Carries out one table row. Submission fields are written first, then
    /// the progress cascade reads the updated verdict in the same transaction.
    async fn apply(
        &self,
        tx: &mut dyn GradingTx,
        submission: &mut Submission,
        exercise: &Exercise,
        step: Step,
        inputs: &EffectInputs<'_>,
        now: PrimitiveDateTime,
    ) -> Result<Option<GradeVerdict>, GradingError> {
        let mode = GradingMode::for_exercise(exercise);
        let mut verdict_status = None;

        for effect in step.effects {
            match effect {
                Effect::RecordAiScore => {
                    let (report, degraded) = inputs.report.ok_or_else(|| missing("AI report"))?;
                    submission.transcript = inputs.transcript.map(str::to_string);
                    submission.ai_score = Some(f64::from(report.overall));
                    submission.ai_axes = Some(Json(report.axes.clone()));
                    submission.ai_explanation = Some(report.feedback.clone());
                    submission.proficiency_band = Some(report.proficiency_band.clone());
                    submission.ai_degraded = degraded;
                    submission.ai_completed_at = Some(now);
                }
                Effect::RecordAiFailure => {
                    let reason = inputs.failure_reason.ok_or_else(|| missing("failure reason"))?;
                    submission.ai_score = Some(0.0);
                    submission.ai_axes = None;
                    submission.ai_explanation = Some(format!(
                        "We could not grade this recording automatically: {reason}. \
                         Please record your answer again."
                    ));
                    submission.ai_completed_at = Some(now);
                    submission.interim_score = None;
                    submission.final_score = Some(0.0);
                    submission.is_passed = Some(false);
                }
                Effect::RecordTeacherScore => {
                    let teacher = inputs.teacher.as_ref().ok_or_else(|| missing("teacher score"))?;
                    submission.teacher_id = Some(teacher.teacher_id.to_string());
                    submission.teacher_score = Some(teacher.score);
                    submission.teacher_feedback = teacher.feedback.map(str::to_string);
                    submission.reviewed_at = Some(now);
                }
                Effect::ReturnAssignment => {
                    let teacher = inputs.teacher.as_ref().ok_or_else(|| missing("assignment"))?;
                    let mut assignment = teacher.assignment.clone();
                    assignment.status = AssignmentStatus::Returned;
                    assignment.completed_at = Some(now);
                    assignment.score = Some(teacher.score);
                    assignment.feedback = teacher.feedback.map(str::to_string);
                    assignment.updated_at = now;
                    tx.save_assignment(&assignment).await?;
                }
                Effect::ApproveEarnings => {
                    let teacher = inputs.teacher.as_ref().ok_or_else(|| missing("assignment"))?;
                    let approved = tx.approve_earnings(&teacher.assignment.id, now).await?;
                    tracing::debug!(assignment_id = %teacher.assignment.id, approved, "Earnings released");
                }
                Effect::ClearTeacherScore => {
                    submission.teacher_id = None;
                    submission.teacher_score = None;
                    submission.teacher_feedback = None;
                    submission.reviewed_at = None;
                    submission.final_score = None;
                    submission.is_passed = None;
                }
                Effect::RevokeOpenAssignments => {
                    let open = tx.list_assignments(&submission.id).await?;
                    for mut assignment in open.into_iter().filter(|a| a.status.is_open()) {
                        revoke(&mut assignment, SYSTEM_ACTOR, AI_FAILURE_REVOCATION, now);
                        tx.save_assignment(&assignment).await?;
                        tracing::info!(
                            submission_id = %submission.id,
                            assignment_id = %assignment.id,
                            "Review assignment closed after AI failure"
                        );
                    }
                }
                Effect::BlendInterim => {
                    let ai_score = submission.ai_score.unwrap_or(0.0);
                    submission.interim_score =
                        Some(blend(ai_score, None, mode, exercise.pass_score).score());
                    submission.final_score = None;
                    submission.is_passed = None;
                }
                Effect::BlendFinal => {
                    let ai_score = submission.ai_score.ok_or_else(|| missing("AI score"))?;
                    match blend(ai_score, submission.teacher_score, mode, exercise.pass_score) {
                        BlendOutcome::Final { score, passed } => {
                            submission.final_score = Some(score);
                            submission.is_passed = Some(passed);
                            verdict_status = Some(if passed {
                                SubmissionStatus::Passed
                            } else {
                                SubmissionStatus::Failed
                            });
                        }
                        BlendOutcome::Interim { .. } => {
                            return Err(missing("teacher score for final blend"));
                        }
                    }
                }
                Effect::RecomputeProgress | Effect::NotifyLearner => {}
            }
        }

        submission.status = match step.to {
            Target::Status(status) => status,
            Target::Verdict => verdict_status.ok_or_else(|| missing("final blend"))?,
        };
        submission.updated_at = now;
        tx.update_submission(submission).await?;

        if step.has(Effect::RecomputeProgress) {
            if let Some(lesson_progress_id) = submission.lesson_progress_id.as_deref() {
                if let Some(lesson) = tx.find_lesson_progress(lesson_progress_id).await? {
                    progress::recompute_from_lesson(tx, lesson, now).await?;
                }
            }
        }

        if !step.has(Effect::NotifyLearner) {
            return Ok(None);
        }
        Ok(Some(GradeVerdict {
            submission_id: submission.id.clone(),
            exercise_id: submission.exercise_id.clone(),
            status: submission.status,
            final_score: submission.final_score.unwrap_or(0.0),
            passed: submission.is_passed.unwrap_or(false),
            message: submission.ai_explanation.clone(),
        }))
    }

    async fn notify(&self, learner_id: &str, verdict: &GradeVerdict) {
        if let Err(err) = self.notifier.notify_grade_result(learner_id, verdict).await {
            tracing::warn!(
                submission_id = %verdict.submission_id,
                error = %format!("{err:#}"),
                "Grade notification failed"
            );
        }
    }
}

fn guard(submission: &Submission, exercise: &Exercise) -> GuardContext {
    GuardContext {
        ai_only: !exercise.needs_teacher_review(),
        teacher_scored: submission.teacher_score.is_some(),
    }
}

fn revoke(assignment: &mut GradingAssignment, manager_id: &str, reason: &str, now: PrimitiveDateTime) {
    assignment.status = AssignmentStatus::Revoked;
    assignment.revoked_by = Some(manager_id.to_string());
    assignment.revoked_at = Some(now);
    assignment.revocation_reason = Some(reason.to_string());
    assignment.updated_at = now;
}

fn missing(what: &str) -> GradingError {
    GradingError::Store(crate::repositories::StoreError::Integrity(format!(
        "transition is missing {what}"
    )))
}

/// The learner's enrollment and latest submission for the exercise, or
/// the reason a new submission is refused.
async fn admission(
    tx: &mut dyn GradingTx,
    learner_id: &str,
    exercise: &Exercise,
) -> Result<(Enrollment, Option<Submission>), GradingError> {
    let enrollment = tx
        .find_enrollment(learner_id, &exercise.course_id)
        .await?
        .ok_or_else(|| GradingError::Forbidden("learner is not enrolled in this course".into()))?;

    let previous = tx.latest_submission_for(learner_id, &exercise.id).await?;
    if let Some(previous) = previous.as_ref().filter(|prev| !prev.status.is_final()) {
        return Err(GradingError::Conflict(format!(
            "submission {} for this exercise is still being graded",
            previous.id
        )));
    }
    Ok((enrollment, previous))
}

async fn load_exercise(tx: &mut dyn GradingTx, exercise_id: &str) -> Result<Exercise, GradingError> {
    tx.find_exercise(exercise_id)
        .await?
        .ok_or_else(|| GradingError::NotFound(format!("exercise {exercise_id}")))
}

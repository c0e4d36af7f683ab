//! Submission lifecycle as a transition table.
//!
//! `next` only decides; the pipeline carries out the effects of the chosen
//! row inside the transaction that holds the submission's row lock.

use std::fmt;

use thiserror::Error;

use crate::db::types::SubmissionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GradingEvent {
    AiCompleted,
    AiFailed,
    /// Decide what follows a fresh AI score.
    Resolve,
    TeacherScored,
    /// Manager moved the review to another teacher.
    Reassigned,
}

impl fmt::Display for GradingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AiCompleted => "ai_completed",
            Self::AiFailed => "ai_failed",
            Self::Resolve => "resolve",
            Self::TeacherScored => "teacher_scored",
            Self::Reassigned => "reassigned",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Guard {
    Always,
    AiOnly,
    HumanReview,
    TeacherScoreRecorded,
    AwaitingTeacher,
}

/// Facts about the submission that guards are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GuardContext {
    pub(crate) ai_only: bool,
    pub(crate) teacher_scored: bool,
}

impl Guard {
    fn holds(self, ctx: GuardContext) -> bool {
        match self {
            Self::Always => true,
            Self::AiOnly => ctx.ai_only,
            Self::HumanReview => !ctx.ai_only,
            Self::TeacherScoreRecorded => !ctx.ai_only && ctx.teacher_scored,
            Self::AwaitingTeacher => !ctx.ai_only && !ctx.teacher_scored,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Status(SubmissionStatus),
    /// Passed or Failed, decided by the final blend.
    Verdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Effect {
    RecordAiScore,
    RecordAiFailure,
    RecordTeacherScore,
    ReturnAssignment,
    ApproveEarnings,
    ClearTeacherScore,
    /// Revokes every open assignment on behalf of the system.
    RevokeOpenAssignments,
    BlendInterim,
    BlendFinal,
    RecomputeProgress,
    NotifyLearner,
}

#[derive(Debug, Clone, Copy)]
struct Row {
    from: SubmissionStatus,
    event: GradingEvent,
    guard: Guard,
    to: Target,
    effects: &'static [Effect],
}

use Effect::*;
use SubmissionStatus::*;

const TABLE: &[Row] = &[
    Row {
        from: PendingAiReview,
        event: GradingEvent::AiCompleted,
        guard: Guard::Always,
        to: Target::Status(AiGraded),
        effects: &[RecordAiScore],
    },
    Row {
        from: PendingAiReview,
        event: GradingEvent::AiFailed,
        guard: Guard::Always,
        to: Target::Status(Failed),
        effects: &[RecordAiFailure, RevokeOpenAssignments, RecomputeProgress, NotifyLearner],
    },
    Row {
        from: PendingAiReview,
        event: GradingEvent::TeacherScored,
        guard: Guard::HumanReview,
        to: Target::Status(PendingAiReview),
        effects: &[RecordTeacherScore, ReturnAssignment, ApproveEarnings],
    },
    Row {
        from: PendingAiReview,
        event: GradingEvent::Reassigned,
        guard: Guard::AwaitingTeacher,
        to: Target::Status(PendingAiReview),
        effects: &[],
    },
    Row {
        from: PendingAiReview,
        event: GradingEvent::Reassigned,
        guard: Guard::TeacherScoreRecorded,
        to: Target::Status(PendingAiReview),
        effects: &[ClearTeacherScore],
    },
    Row {
        from: AiGraded,
        event: GradingEvent::Resolve,
        guard: Guard::AiOnly,
        to: Target::Verdict,
        effects: &[BlendFinal, RecomputeProgress, NotifyLearner],
    },
    Row {
        from: AiGraded,
        event: GradingEvent::Resolve,
        guard: Guard::TeacherScoreRecorded,
        to: Target::Verdict,
        effects: &[BlendFinal, RecomputeProgress, NotifyLearner],
    },
    Row {
        from: AiGraded,
        event: GradingEvent::Resolve,
        guard: Guard::AwaitingTeacher,
        to: Target::Status(PendingTeacherReview),
        effects: &[BlendInterim],
    },
    Row {
        from: PendingTeacherReview,
        event: GradingEvent::TeacherScored,
        guard: Guard::HumanReview,
        to: Target::Verdict,
        effects: &[
            RecordTeacherScore,
            ReturnAssignment,
            ApproveEarnings,
            BlendFinal,
            RecomputeProgress,
            NotifyLearner,
        ],
    },
    Row {
        from: PendingTeacherReview,
        event: GradingEvent::Reassigned,
        guard: Guard::HumanReview,
        to: Target::Status(PendingTeacherReview),
        effects: &[],
    },
    Row {
        from: Passed,
        event: GradingEvent::Reassigned,
        guard: Guard::HumanReview,
        to: Target::Status(PendingTeacherReview),
        effects: &[ClearTeacherScore, BlendInterim, RecomputeProgress],
    },
    Row {
        from: Failed,
        event: GradingEvent::Reassigned,
        guard: Guard::HumanReview,
        to: Target::Status(PendingTeacherReview),
        effects: &[ClearTeacherScore, BlendInterim, RecomputeProgress],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Step {
    pub(crate) to: Target,
    pub(crate) effects: &'static [Effect],
}

impl Step {
    pub(crate) fn has(&self, effect: Effect) -> bool {
        self.effects.contains(&effect)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot apply {event} to a submission in {}", .from.as_str())]
pub(crate) struct TransitionError {
    pub(crate) from: SubmissionStatus,
    pub(crate) event: GradingEvent,
}

pub(crate) fn next(
    from: SubmissionStatus,
    event: GradingEvent,
    ctx: GuardContext,
) -> Result<Step, TransitionError> {
    TABLE
        .iter()
        .find(|row| row.from == from && row.event == event && row.guard.holds(ctx))
        .map(|row| Step { to: row.to, effects: row.effects })
        .ok_or(TransitionError { from, event })
}

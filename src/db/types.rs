use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "submissionstatus", rename_all = "snake_case")]
pub(crate) enum SubmissionStatus {
    PendingAiReview,
    AiGraded,
    PendingTeacherReview,
    Passed,
    Failed,
}

impl SubmissionStatus {
    pub(crate) fn is_final(self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::PendingAiReview => "pending_ai_review",
            Self::AiGraded => "ai_graded",
            Self::PendingTeacherReview => "pending_teacher_review",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "assignmentstatus", rename_all = "lowercase")]
pub(crate) enum AssignmentStatus {
    Pending,
    Assigned,
    Returned,
    Revoked,
}

impl AssignmentStatus {
    /// Pending (no teacher yet) and Assigned both count as the open review slot.
    pub(crate) fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Assigned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "progressstatus", rename_all = "snake_case")]
pub(crate) enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "exercisetype", rename_all = "snake_case")]
pub(crate) enum ExerciseType {
    RepeatAfterMe,
    ReadAloud,
    PictureDescription,
    StoryTelling,
    QuestionAnswer,
    Debate,
}

impl ExerciseType {
    /// Open-ended speaking tasks that a teacher must review when the
    /// exercise gives the teacher a non-zero weight.
    pub(crate) fn requires_human_judgment(self) -> bool {
        matches!(self, Self::StoryTelling | Self::Debate)
    }

    pub(crate) fn uses_images(self) -> bool {
        matches!(self, Self::PictureDescription | Self::StoryTelling)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::RepeatAfterMe => "repeat_after_me",
            Self::ReadAloud => "read_aloud",
            Self::PictureDescription => "picture_description",
            Self::StoryTelling => "story_telling",
            Self::QuestionAnswer => "question_answer",
            Self::Debate => "debate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "earningstatus", rename_all = "lowercase")]
pub(crate) enum EarningStatus {
    Pending,
    Approved,
}

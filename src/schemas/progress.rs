use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::types::ProgressStatus;
use crate::services::progress::{ActivityKind, ProgressSnapshot};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ActivityRequest {
    #[validate(length(min = 1, message = "lesson_id is required"))]
    pub(crate) lesson_id: String,
    pub(crate) activity: ActivityKind,
}

#[derive(Debug, Serialize)]
pub(crate) struct LevelProgress {
    pub(crate) id: String,
    pub(crate) percent: f64,
    pub(crate) status: ProgressStatus,
    pub(crate) completed_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProgressResponse {
    pub(crate) lesson: LevelProgress,
    pub(crate) content_viewed: bool,
    pub(crate) video_watched: bool,
    pub(crate) document_read: bool,
    pub(crate) practice_completed: bool,
    pub(crate) unit: Option<LevelProgress>,
    pub(crate) enrollment: Option<LevelProgress>,
}

impl From<ProgressSnapshot> for ProgressResponse {
    fn from(snapshot: ProgressSnapshot) -> Self {
        let ProgressSnapshot { lesson, unit, enrollment } = snapshot;
        Self {
            content_viewed: lesson.content_viewed,
            video_watched: lesson.video_watched,
            document_read: lesson.document_read,
            practice_completed: lesson.practice_completed,
            lesson: LevelProgress {
                id: lesson.lesson_id,
                percent: lesson.percent,
                status: lesson.status,
                completed_at: lesson.completed_at.map(format_primitive),
            },
            unit: unit.map(|unit| LevelProgress {
                id: unit.unit_id,
                percent: unit.percent,
                status: unit.status,
                completed_at: unit.completed_at.map(format_primitive),
            }),
            enrollment: enrollment.map(|enrollment| LevelProgress {
                id: enrollment.enrollment_id,
                percent: enrollment.percent,
                status: enrollment.status,
                completed_at: enrollment.completed_at.map(format_primitive),
            }),
        }
    }
}

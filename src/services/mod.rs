pub(crate) mod evaluation;
pub(crate) mod grading;
pub(crate) mod notifications;
pub(crate) mod progress;
pub(crate) mod retry;
pub(crate) mod score_blend;
pub(crate) mod storage;
pub(crate) mod transcription;

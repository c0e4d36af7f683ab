use thiserror::Error;

use crate::repositories::StoreError;
use crate::services::grading::state_machine::TransitionError;

#[derive(Debug, Error)]
pub(crate) enum GradingError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("too many submissions, slow down")]
    RateLimited,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("audio storage failed: {0:#}")]
    Storage(anyhow::Error),
}

impl From<TransitionError> for GradingError {
    fn from(err: TransitionError) -> Self {
        Self::Conflict(err.to_string())
    }
}

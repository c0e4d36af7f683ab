mod errors;
mod pipeline;
mod state_machine;


pub(crate) use errors::GradingError;
pub(crate) use pipeline::{AudioUpload, GradingPipeline, GradingStatusView, PipelineLimits};

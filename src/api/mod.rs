pub(crate) mod assignments;
pub(crate) mod errors;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod pagination;
pub(crate) mod progress;
pub(crate) mod router;
pub(crate) mod submissions;

//! Re-exports the wire types this service and the remote executor share.
//! The types themselves live in `dagflow_core::worker_protocol` so the
//! scheduler can build requests without depending on this crate's service
//! code (and this crate's binary doesn't need the scheduler to talk the
//! protocol).

pub use dagflow_core::{NodeRecipe, Operation, StatusResponse, SubmitRequest, SubmitResponse, TaskState};

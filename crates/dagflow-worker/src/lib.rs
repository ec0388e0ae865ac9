//! Stateless HTTP worker for the remote executor: accepts `compute_and_cache`
//! / `sample` / `row_count` tasks, executes them against the same
//! `DataFusionAdapter`/`node_exec` dispatch the engine's own local executor
//! uses, and caches results content-addressed so the engine's `/fetch` pulls
//! are just file reads. `python_script` nodes take a separate path —
//! `python_exec` generates and runs the node's code out-of-process, since
//! this worker has no embedded Python runtime of its own.

pub mod protocol;
pub mod python_exec;
pub mod service;

pub use service::{router, WorkerState};

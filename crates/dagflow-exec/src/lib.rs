//! Run scheduler: orders a graph into levels, executes each node locally
//! against the Dataframe Adapter or remotely against a worker, and caches
//! completed output content-addressed by `Node.hash`.

pub mod cache;
pub mod local_executor;
pub mod node_exec;
pub mod remote_executor;
pub mod scheduler;

pub use cache::FsCache;
pub use remote_executor::RemoteExecutor;
pub use scheduler::Scheduler;

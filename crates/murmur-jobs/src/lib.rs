pub mod pool;
pub mod queue;
pub mod worker;

pub use pool::WorkerPool;
pub use queue::{DeadJob, FailureOutcome, JobQueue, QueueSettings, QueuedJob, RemovalJob};
pub use worker::RemovalWorker;

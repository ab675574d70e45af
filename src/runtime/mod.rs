//! Runtime adapters running the scheduler and workers on OS threads.

pub mod threads;

pub use threads::{spawn_scheduler, SchedulerHandle};
#[cfg(feature = "tokio-runtime")]
pub use threads::{spawn_workers, WorkerHandle};

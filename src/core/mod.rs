//! Scheduling engine: tasks, per-owner queues, cursors and the dispatcher.

pub mod error;
pub mod task;
pub mod entry;
pub mod cursor;
pub mod queue;
pub mod endpoint;
pub mod scheduler;
pub mod audit;
#[cfg(feature = "tokio-runtime")]
pub mod handler;
#[cfg(feature = "tokio-runtime")]
pub mod worker;

pub use error::{AppResult, SchedulerError, TaskUnprocessable, UnprocessableReason};
pub use task::{OperationClass, OwnerId, ResourceId, SharedResUsage, Task, TaskId, TaskState};
pub use entry::{Entry, SchedulingState};
pub use cursor::{AnalysisCursor, Cursor, ImportCursor, TraversalPolicy, Verdict};
pub use queue::Queue;
pub use endpoint::{Delivery, Inbound, IngressEndpoint, Refusal, SchedulerEndpoint, WorkerEndpoint};
pub use scheduler::{DispatchReport, QueueStats, Scheduler, SchedulerStats};
pub use audit::{AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, build_audit_event};
#[cfg(feature = "tokio-runtime")]
pub use handler::TaskHandler;
#[cfg(feature = "tokio-runtime")]
pub use worker::{Safeguard, WorkOutcome, Worker, WorkerExit};

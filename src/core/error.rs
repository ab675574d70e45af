//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::task::{TaskId, TaskState};

/// Errors produced by scheduler components.
///
/// Boundary errors (`InvalidArgument`, `Malformed`) reject bad input before it
/// reaches a queue. The remaining variants report a broken queue/entry
/// invariant and are fatal for the operation that triggered them.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Constructor argument is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Wire payload could not be decoded into a task.
    #[error("malformed task payload: {0}")]
    Malformed(String),
    /// Task arrived in a state the scheduler must never observe.
    #[error("task #{task_id} is in illegal state `{state}`")]
    IllegalTaskState {
        /// Offending task.
        task_id: TaskId,
        /// External state carried by the task.
        state: TaskState,
    },
    /// Task does not belong where it was routed (foreign owner, different id).
    #[error("mismatch: {0}")]
    Mismatch(String),
    /// Task is already enqueued.
    #[error("task #{task_id} is already enqueued")]
    Duplicate {
        /// Duplicate task.
        task_id: TaskId,
    },
    /// Task is not enqueued.
    #[error("there is no task #{task_id} in this queue")]
    NotFound {
        /// Missing task.
        task_id: TaskId,
    },
    /// Operation is not valid for the entry's current scheduling state.
    #[error("illegal state: {0}")]
    IllegalState(String),
    /// Ready/importing task carries no shared-resource usage declaration.
    #[error("task #{task_id} has no shared resource usage declaration")]
    SharedResourceInfoMissing {
        /// Task missing its declaration.
        task_id: TaskId,
    },
    /// A scheduled-task counter would go negative.
    #[error("scheduled counter underflow: {0}")]
    CounterUnderflow(&'static str),
    /// Broker/transport failure with context.
    #[error("transport error: {0}")]
    Transport(String),
    /// Configuration failed validation.
    #[error("config invalid: {0}")]
    Config(String),
    /// Runtime construction failed.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl SchedulerError {
    /// Whether this error rejects inbound data at the boundary, as opposed to
    /// reporting a corrupted queue. The event loop logs and drops these.
    #[must_use]
    pub const fn is_boundary_rejection(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::Malformed(_))
    }
}

/// Reason a worker could not process a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnprocessableReason {
    /// Underlying subject is absent in storage.
    Missing,
    /// Underlying subject is locked or failed to lock.
    Locked,
    /// Underlying subject has an unexpected state.
    InvalidState,
    /// Anything else, with context.
    Other(String),
}

/// Worker-side failure: the task cannot be processed and gets rejected
/// (dead-lettered back to the scheduler's refused channel).
#[derive(Debug, Error)]
#[error("task #{task_id} is unprocessable: {}", describe(.reason, .state))]
pub struct TaskUnprocessable {
    /// Task that could not be processed.
    pub task_id: TaskId,
    /// State the task arrived in.
    pub state: TaskState,
    /// Why it could not be processed.
    pub reason: UnprocessableReason,
}

fn describe(reason: &UnprocessableReason, state: &TaskState) -> String {
    match reason {
        UnprocessableReason::Missing => "underlying file is absent in storage".into(),
        UnprocessableReason::Locked => "underlying file is locked or failed to lock".into(),
        UnprocessableReason::InvalidState => {
            format!("underlying file has invalid/unexpected state (task arrived as {state})")
        }
        UnprocessableReason::Other(msg) => msg.clone(),
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

//! Queue entry: a task plus its derived scheduling state.
//!
//! Entries fall into two groups. `New`/`ShdAnalysis` entries have no shared
//! resource usage declaration yet and never conflict with each other.
//! `Ready`/`ShdImport` entries carry a declaration and need strict order
//! enforcement plus resource arbitration.
//!
//! `ShdAnalysis` and `ShdImport` are virtual: only the scheduler sets them,
//! and they mean "published to workers", not necessarily "being processed".

use std::fmt;

use crate::core::task::{SharedResUsage, Task, TaskId, TaskState};
use crate::core::SchedulerError;

/// Scheduling state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulingState {
    /// Waiting for analysis.
    New,
    /// Published for analysis.
    ShdAnalysis,
    /// Waiting for import.
    Ready,
    /// Published for import.
    ShdImport,
    /// Scheduler is done with the task; dequeued immediately.
    Completed,
}

impl SchedulingState {
    /// Whether the entry is published to workers.
    #[must_use]
    pub const fn is_scheduled(self) -> bool {
        matches!(self, Self::ShdAnalysis | Self::ShdImport)
    }
}

impl fmt::Display for SchedulingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::ShdAnalysis => "shd_analysis",
            Self::Ready => "ready",
            Self::ShdImport => "shd_import",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// A `from → to` transition graph.
pub type TransitionGraph = [(SchedulingState, SchedulingState)];

/// Graph applied when a task is published to workers.
pub const MARK_SCHEDULED: &TransitionGraph = &[
    (SchedulingState::New, SchedulingState::ShdAnalysis),
    (SchedulingState::Ready, SchedulingState::ShdImport),
];

/// Graph applied when a published task comes back undelivered.
pub const REVERT_SCHEDULED: &TransitionGraph = &[
    (SchedulingState::ShdAnalysis, SchedulingState::New),
    (SchedulingState::ShdImport, SchedulingState::Ready),
];

/// Queue entry owning the current version of its task.
#[derive(Debug, Clone)]
pub struct Entry {
    task: Task,
    state: SchedulingState,
}

impl Entry {
    /// Wrap a task, deriving its scheduling state.
    ///
    /// # Errors
    ///
    /// Returns `IllegalTaskState` for transitional or unknown task states.
    pub fn new(task: Task) -> Result<Self, SchedulerError> {
        let state = derive_state(&task)?;
        Ok(Self { task, state })
    }

    /// Task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.task.id()
    }

    /// Current task version.
    #[must_use]
    pub const fn task(&self) -> &Task {
        &self.task
    }

    /// Current scheduling state.
    #[must_use]
    pub const fn state(&self) -> SchedulingState {
        self.state
    }

    /// Whether the entry is in any of the given states.
    #[must_use]
    pub fn is_in(&self, states: &[SchedulingState]) -> bool {
        states.contains(&self.state)
    }

    /// Whether the scheduler is done with this entry.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == SchedulingState::Completed
    }

    /// Replace the task with an updated version and re-derive the state.
    /// The entry is untouched if this fails.
    ///
    /// # Errors
    ///
    /// Returns `Mismatch` if the ids differ and `IllegalTaskState` if the new
    /// version is in a state the scheduler must not see.
    pub fn sync_to_updated_task(&mut self, task: Task) -> Result<(), SchedulerError> {
        if task.id() != self.task.id() {
            return Err(SchedulerError::Mismatch(format!(
                "sync_to_updated_task() called with mismatching task ({} -> {})",
                self.task.id(),
                task.id()
            )));
        }
        let state = derive_state(&task)?;
        self.task = task;
        self.state = state;
        Ok(())
    }

    /// Move along `graph` if the current state is one of its sources.
    /// Returns whether a transition happened.
    pub fn transition(&mut self, graph: &TransitionGraph) -> bool {
        match graph.iter().find(|(from, _)| *from == self.state) {
            Some(&(_, to)) => {
                self.state = to;
                true
            }
            None => false,
        }
    }

    /// Shared resource usage declaration.
    ///
    /// # Errors
    ///
    /// Returns `SharedResourceInfoMissing` if the entry is in the ready/import
    /// group without a declaration.
    pub fn shared_res_usage(&self) -> Result<Option<&SharedResUsage>, SchedulerError> {
        match (self.task.shared_res_usage(), self.state) {
            (None, SchedulingState::Ready | SchedulingState::ShdImport) => {
                Err(SchedulerError::SharedResourceInfoMissing { task_id: self.id() })
            }
            (sru, _) => Ok(sru),
        }
    }
}

/// Total mapping from external task state to scheduling state.
fn derive_state(task: &Task) -> Result<SchedulingState, SchedulerError> {
    match task.state() {
        TaskState::New => Ok(SchedulingState::New),
        TaskState::Ready => Ok(SchedulingState::Ready),
        // Scheduler does not distinguish terminal outcomes; nothing is left to do until a
        // user intervenes and the task is re-published.
        TaskState::Done
        | TaskState::Error
        | TaskState::DataCfgRequired
        | TaskState::ProcessingCfgRequired => Ok(SchedulingState::Completed),
        state @ (TaskState::Analyzing | TaskState::Importing | TaskState::Other(_)) => {
            Err(SchedulerError::IllegalTaskState {
                task_id: task.id(),
                state: state.clone(),
            })
        }
    }
}

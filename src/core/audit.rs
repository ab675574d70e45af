//! Audit trail of scheduling decisions.
//!
//! The scheduler records one event per queue mutation or publish when a sink
//! is attached. The in-memory sink keeps a bounded buffer and can be cloned
//! to inspect events while the scheduler owns it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::core::task::{OperationClass, OwnerId, Task, TaskId};
use crate::util::clock::now_ms;

/// Action the scheduler took on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// Appended to its owner queue.
    Enqueue,
    /// Ingress for a task already enqueued.
    Duplicate,
    /// Published to workers.
    Publish,
    /// Updated by a processed message.
    Update,
    /// Dequeued after reaching a terminal state.
    Complete,
    /// Removed after a worker rejected it.
    Reject,
    /// Reverted after the broker returned it.
    Return,
}

impl AuditAction {
    /// Stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enqueue => "enqueue",
            Self::Duplicate => "duplicate",
            Self::Publish => "publish",
            Self::Update => "update",
            Self::Complete => "complete",
            Self::Reject => "reject",
            Self::Return => "return",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit event structure.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Related task.
    pub task_id: TaskId,
    /// Owner of the task.
    pub owner_id: OwnerId,
    /// Action taken.
    pub action: AuditAction,
    /// Operation class, for publishes.
    pub class: Option<OperationClass>,
    /// External task state at the time of the event.
    pub state: String,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

impl<S: AuditSink + ?Sized> AuditSink for Box<S> {
    fn record(&mut self, event: AuditEvent) {
        (**self).record(event);
    }
}

/// Bounded in-memory audit sink. Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Stored events for one task, oldest first.
    #[must_use]
    pub fn events_for(&self, task_id: TaskId) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Build an audit event for a task.
#[must_use]
pub fn build_audit_event(
    task: &Task,
    action: AuditAction,
    class: Option<OperationClass>,
) -> AuditEvent {
    AuditEvent {
        event_id: Uuid::new_v4().to_string(),
        task_id: task.id(),
        owner_id: task.owner_id(),
        action,
        class,
        state: task.state().to_string(),
        created_at_ms: now_ms(),
    }
}

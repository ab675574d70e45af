//! Messaging boundary between the scheduler, its workers and task producers.
//!
//! The scheduler consumes one tagged stream of [`Inbound`] messages and
//! publishes tasks for one [`OperationClass`] at a time. Publishes are
//! mandatory: a task that no worker queue accepts comes back as
//! [`Refusal::Returned`]. A task a worker could not process comes back as
//! [`Refusal::Rejected`].

use std::time::Duration;

use crate::core::task::{OperationClass, Task};
use crate::core::SchedulerError;

/// Why a published task came back to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// A worker rejected the task as unprocessable.
    Rejected,
    /// No worker queue was bound for the task's class.
    Returned,
}

impl Refusal {
    /// Log-friendly label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rejected => "REJECTED",
            Self::Returned => "RETURNED",
        }
    }
}

/// Message delivered to the scheduler.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// New task from a producer.
    Ingress(Task),
    /// Updated task from a worker.
    Processed(Task),
    /// Task as originally published, refused by a worker or the broker.
    Refused {
        /// The task as the scheduler published it.
        task: Task,
        /// Rejected vs returned.
        refusal: Refusal,
    },
}

impl Inbound {
    /// Task carried by the message.
    #[must_use]
    pub const fn task(&self) -> &Task {
        match self {
            Self::Ingress(task) | Self::Processed(task) | Self::Refused { task, .. } => task,
        }
    }
}

/// Scheduler side of the broker.
pub trait SchedulerEndpoint: Send {
    /// Wait at most `max_wait` for one inbound message.
    ///
    /// # Errors
    ///
    /// `Malformed`/`InvalidArgument` for a body that does not decode into a
    /// task (the message is consumed), `Transport` for broker failures.
    fn wait_for_event(&mut self, max_wait: Duration) -> Result<Option<Inbound>, SchedulerError>;

    /// Publish a task to the workers of `class`.
    ///
    /// # Errors
    ///
    /// `Transport` if the broker is unreachable.
    fn publish(&mut self, task: &Task, class: OperationClass) -> Result<(), SchedulerError>;
}

/// A task handed to a worker, pending acknowledgement.
#[derive(Debug)]
pub struct Delivery {
    tag: u64,
    task: Task,
    body: Vec<u8>,
}

impl Delivery {
    /// Wrap a decoded delivery.
    #[must_use]
    pub const fn new(tag: u64, task: Task, body: Vec<u8>) -> Self {
        Self { tag, task, body }
    }

    /// Broker-assigned delivery tag.
    #[must_use]
    pub const fn tag(&self) -> u64 {
        self.tag
    }

    /// Delivered task.
    #[must_use]
    pub const fn task(&self) -> &Task {
        &self.task
    }

    /// Raw message body, dead-lettered unchanged on reject.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Split into tag, task and body.
    #[must_use]
    pub fn into_parts(self) -> (u64, Task, Vec<u8>) {
        (self.tag, self.task, self.body)
    }
}

/// Worker side of the broker. Workers of one class share a queue and get
/// at most one unacknowledged delivery each.
pub trait WorkerEndpoint: Send {
    /// Class this endpoint consumes.
    fn class(&self) -> OperationClass;

    /// Wait at most `max_wait` for the next task.
    ///
    /// # Errors
    ///
    /// `Malformed`/`InvalidArgument` for undecodable bodies (already
    /// dead-lettered), `IllegalState` if the previous delivery is still
    /// unacknowledged, `Transport` for broker failures.
    fn next_delivery(&mut self, max_wait: Duration) -> Result<Option<Delivery>, SchedulerError>;

    /// Report a processed task back to the scheduler.
    ///
    /// # Errors
    ///
    /// `Transport` if the broker is unreachable.
    fn publish_processed(&mut self, task: &Task) -> Result<(), SchedulerError>;

    /// Acknowledge a delivery.
    ///
    /// # Errors
    ///
    /// `Transport` if the delivery is unknown to the broker.
    fn ack(&mut self, delivery: Delivery) -> Result<(), SchedulerError>;

    /// Reject a delivery without requeue; it is dead-lettered to the scheduler.
    ///
    /// # Errors
    ///
    /// `Transport` if the delivery is unknown to the broker.
    fn reject(&mut self, delivery: Delivery) -> Result<(), SchedulerError>;
}

/// Producer side of the broker.
pub trait IngressEndpoint: Send + Sync {
    /// Publish one new task.
    ///
    /// # Errors
    ///
    /// `Transport` if the broker is unreachable.
    fn publish(&self, task: &Task) -> Result<(), SchedulerError>;

    /// Publish several tasks in order. Preferred for bulk producers, since the
    /// scheduler drains pending messages before each dispatch pass.
    ///
    /// # Errors
    ///
    /// Stops at the first failing publish.
    fn publish_batch(&self, tasks: &[Task]) -> Result<(), SchedulerError> {
        tasks.iter().try_for_each(|task| self.publish(task))
    }
}

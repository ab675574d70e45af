//! In-process broker modelled on a topic exchange.
//!
//! Routing keys: `ingress`, `scheduled.<class>`, `processed.<class>` and
//! `refused.<class>`. Everything but `scheduled.*` lands on the scheduler's
//! single inbound channel. `scheduled.<class>` lands on the worker queue for
//! that class, declared by the first worker endpoint of the class and kept
//! for the broker's lifetime. Scheduler publishes are mandatory: with no
//! queue declared, the message is returned to the scheduler.
//!
//! Bodies travel as JSON bytes and are decoded by the receiving endpoint.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::endpoint::{
    Delivery, Inbound, IngressEndpoint, Refusal, SchedulerEndpoint, WorkerEndpoint,
};
use crate::core::task::{OperationClass, Task};
use crate::core::SchedulerError;

/// Exchange name shared by all task traffic.
pub const EXCHANGE: &str = "import.tasks";

/// Message route on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// New task from a producer.
    Ingress,
    /// Task published to workers.
    Scheduled(OperationClass),
    /// Worker result.
    Processed(OperationClass),
    /// Dead-lettered worker delivery.
    Refused(OperationClass),
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => f.write_str("ingress"),
            Self::Scheduled(class) => write!(f, "scheduled.{class}"),
            Self::Processed(class) => write!(f, "processed.{class}"),
            Self::Refused(class) => write!(f, "refused.{class}"),
        }
    }
}

/// Message on the scheduler's inbound channel.
enum Routed {
    Ingress(Vec<u8>),
    Processed(Vec<u8>),
    Refused(Vec<u8>, Refusal),
}

struct WorkerQueue {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

#[derive(Default)]
struct BrokerState {
    scheduler_claimed: bool,
    worker_queues: HashMap<OperationClass, WorkerQueue>,
    unacked: HashMap<u64, (OperationClass, Vec<u8>)>,
    next_tag: u64,
}

struct Inner {
    scheduler_tx: Sender<Routed>,
    scheduler_rx: Receiver<Routed>,
    state: Mutex<BrokerState>,
}

impl Inner {
    fn route(&self, route: Route, body: Vec<u8>) -> Result<(), SchedulerError> {
        debug!(exchange = EXCHANGE, routing_key = %route, bytes = body.len(), "Routing message");
        let routed = match route {
            Route::Ingress => Routed::Ingress(body),
            Route::Processed(_) => Routed::Processed(body),
            Route::Refused(_) => Routed::Refused(body, Refusal::Rejected),
            Route::Scheduled(class) => {
                let state = self.state.lock();
                if let Some(queue) = state.worker_queues.get(&class) {
                    return queue
                        .tx
                        .send(body)
                        .map_err(|e| SchedulerError::Transport(format!("worker queue `{route}`: {e}")));
                }
                drop(state);
                warn!(routing_key = %route, "Unroutable mandatory message, returning");
                Routed::Refused(body, Refusal::Returned)
            }
        };
        self.scheduler_tx
            .send(routed)
            .map_err(|e| SchedulerError::Transport(format!("scheduler channel: {e}")))
    }
}

/// Shared in-memory broker. Clones refer to the same broker.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Create an empty broker with no worker queues declared.
    #[must_use]
    pub fn new() -> Self {
        let (scheduler_tx, scheduler_rx) = unbounded();
        Self {
            inner: Arc::new(Inner {
                scheduler_tx,
                scheduler_rx,
                state: Mutex::new(BrokerState::default()),
            }),
        }
    }

    /// Claim the scheduler endpoint. Only one may exist at a time.
    ///
    /// # Errors
    ///
    /// `IllegalState` if a scheduler endpoint is already claimed.
    pub fn scheduler_endpoint(&self) -> Result<InMemorySchedulerEndpoint, SchedulerError> {
        let mut state = self.inner.state.lock();
        if state.scheduler_claimed {
            return Err(SchedulerError::IllegalState(
                "a scheduler endpoint is already attached to this broker".into(),
            ));
        }
        state.scheduler_claimed = true;
        Ok(InMemorySchedulerEndpoint { inner: Arc::clone(&self.inner) })
    }

    /// Create a worker endpoint, declaring the class queue if needed.
    #[must_use]
    pub fn worker_endpoint(&self, class: OperationClass) -> InMemoryWorkerEndpoint {
        let mut state = self.inner.state.lock();
        let queue = state.worker_queues.entry(class).or_insert_with(|| {
            debug!(%class, "Declaring worker queue");
            let (tx, rx) = unbounded();
            WorkerQueue { tx, rx }
        });
        let rx = queue.rx.clone();
        drop(state);
        InMemoryWorkerEndpoint {
            inner: Arc::clone(&self.inner),
            class,
            rx,
            in_flight: None,
        }
    }

    /// Create a producer endpoint.
    #[must_use]
    pub fn ingress_endpoint(&self) -> InMemoryIngressEndpoint {
        InMemoryIngressEndpoint { inner: Arc::clone(&self.inner) }
    }

    /// Whether a worker queue is declared for `class`.
    #[must_use]
    pub fn is_declared(&self, class: OperationClass) -> bool {
        self.inner.state.lock().worker_queues.contains_key(&class)
    }

    /// Messages waiting in the worker queue of `class`.
    #[must_use]
    pub fn pending_for_workers(&self, class: OperationClass) -> usize {
        self.inner
            .state
            .lock()
            .worker_queues
            .get(&class)
            .map_or(0, |q| q.rx.len())
    }

    /// Messages waiting for the scheduler.
    #[must_use]
    pub fn pending_for_scheduler(&self) -> usize {
        self.inner.scheduler_rx.len()
    }

    /// Deliveries handed to workers and not yet acked or rejected.
    #[must_use]
    pub fn unacked(&self) -> usize {
        self.inner.state.lock().unacked.len()
    }
}

/// Scheduler side of [`InMemoryBroker`]. Dropping it releases the claim.
pub struct InMemorySchedulerEndpoint {
    inner: Arc<Inner>,
}

impl SchedulerEndpoint for InMemorySchedulerEndpoint {
    fn wait_for_event(&mut self, max_wait: Duration) -> Result<Option<Inbound>, SchedulerError> {
        let routed = match self.inner.scheduler_rx.recv_timeout(max_wait) {
            Ok(routed) => routed,
            Err(RecvTimeoutError::Timeout) => return Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(SchedulerError::Transport("scheduler channel disconnected".into()))
            }
        };
        let inbound = match routed {
            Routed::Ingress(body) => Inbound::Ingress(Task::from_json(&body)?),
            Routed::Processed(body) => Inbound::Processed(Task::from_json(&body)?),
            Routed::Refused(body, refusal) => Inbound::Refused {
                task: Task::from_json(&body)?,
                refusal,
            },
        };
        Ok(Some(inbound))
    }

    fn publish(&mut self, task: &Task, class: OperationClass) -> Result<(), SchedulerError> {
        self.inner.route(Route::Scheduled(class), task.to_json()?)
    }
}

impl Drop for InMemorySchedulerEndpoint {
    fn drop(&mut self) {
        self.inner.state.lock().scheduler_claimed = false;
    }
}

/// Worker side of [`InMemoryBroker`] for one class.
///
/// Dropping it with a delivery outstanding requeues that delivery.
pub struct InMemoryWorkerEndpoint {
    inner: Arc<Inner>,
    class: OperationClass,
    rx: Receiver<Vec<u8>>,
    in_flight: Option<u64>,
}

impl InMemoryWorkerEndpoint {
    fn settle(&mut self, tag: u64) -> Result<Vec<u8>, SchedulerError> {
        if self.in_flight == Some(tag) {
            self.in_flight = None;
        }
        self.inner
            .state
            .lock()
            .unacked
            .remove(&tag)
            .map(|(_, body)| body)
            .ok_or_else(|| SchedulerError::Transport(format!("unknown delivery tag {tag}")))
    }
}

impl WorkerEndpoint for InMemoryWorkerEndpoint {
    fn class(&self) -> OperationClass {
        self.class
    }

    fn next_delivery(&mut self, max_wait: Duration) -> Result<Option<Delivery>, SchedulerError> {
        if let Some(tag) = self.in_flight {
            return Err(SchedulerError::IllegalState(format!(
                "delivery {tag} is still unacknowledged"
            )));
        }
        let body = match self.rx.recv_timeout(max_wait) {
            Ok(body) => body,
            Err(RecvTimeoutError::Timeout) => return Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(SchedulerError::Transport("worker queue disconnected".into()))
            }
        };
        match Task::from_json(&body) {
            Ok(task) => {
                let tag = {
                    let mut state = self.inner.state.lock();
                    state.next_tag += 1;
                    let tag = state.next_tag;
                    state.unacked.insert(tag, (self.class, body.clone()));
                    tag
                };
                self.in_flight = Some(tag);
                Ok(Some(Delivery::new(tag, task, body)))
            }
            Err(err) => {
                warn!(class = %self.class, error = %err, "Dead-lettering undecodable delivery");
                self.inner.route(Route::Refused(self.class), body)?;
                Err(err)
            }
        }
    }

    fn publish_processed(&mut self, task: &Task) -> Result<(), SchedulerError> {
        self.inner.route(Route::Processed(self.class), task.to_json()?)
    }

    fn ack(&mut self, delivery: Delivery) -> Result<(), SchedulerError> {
        self.settle(delivery.tag()).map(drop)
    }

    fn reject(&mut self, delivery: Delivery) -> Result<(), SchedulerError> {
        let body = self.settle(delivery.tag())?;
        self.inner.route(Route::Refused(self.class), body)
    }
}

impl Drop for InMemoryWorkerEndpoint {
    fn drop(&mut self) {
        let Some(tag) = self.in_flight.take() else {
            return;
        };
        let mut state = self.inner.state.lock();
        if let Some((class, body)) = state.unacked.remove(&tag) {
            if let Some(queue) = state.worker_queues.get(&class) {
                let _ = queue.tx.send(body);
            }
        }
    }
}

/// Producer side of [`InMemoryBroker`].
#[derive(Clone)]
pub struct InMemoryIngressEndpoint {
    inner: Arc<Inner>,
}

impl IngressEndpoint for InMemoryIngressEndpoint {
    fn publish(&self, task: &Task) -> Result<(), SchedulerError> {
        self.inner.route(Route::Ingress, task.to_json()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{SharedResUsage, TaskState};

    const WAIT: Duration = Duration::from_millis(10);

    fn task(id: u64) -> Task {
        Task::new(id, 1, TaskState::New, None).unwrap()
    }

    #[test]
    fn test_routing_keys() {
        assert_eq!(Route::Ingress.to_string(), "ingress");
        assert_eq!(Route::Scheduled(OperationClass::Import).to_string(), "scheduled.import");
        assert_eq!(Route::Processed(OperationClass::Analysis).to_string(), "processed.analysis");
        assert_eq!(Route::Refused(OperationClass::Import).to_string(), "refused.import");
    }

    #[test]
    fn test_single_scheduler_endpoint() {
        let broker = InMemoryBroker::new();
        let first = broker.scheduler_endpoint().unwrap();
        assert!(matches!(broker.scheduler_endpoint(), Err(SchedulerError::IllegalState(_))));
        drop(first);
        assert!(broker.scheduler_endpoint().is_ok());
    }

    #[test]
    fn test_ingress_reaches_scheduler() {
        let broker = InMemoryBroker::new();
        let mut sched = broker.scheduler_endpoint().unwrap();
        broker.ingress_endpoint().publish_batch(&[task(1), task(2)]).unwrap();

        let ids: Vec<u64> = std::iter::from_fn(|| sched.wait_for_event(WAIT).unwrap())
            .map(|inbound| match inbound {
                Inbound::Ingress(t) => t.id(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_unroutable_publish_is_returned() {
        let broker = InMemoryBroker::new();
        let mut sched = broker.scheduler_endpoint().unwrap();
        sched.publish(&task(1), OperationClass::Import).unwrap();

        match sched.wait_for_event(WAIT).unwrap() {
            Some(Inbound::Refused { task, refusal }) => {
                assert_eq!(task.id(), 1);
                assert_eq!(refusal, Refusal::Returned);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_worker_ack_and_processed() {
        let broker = InMemoryBroker::new();
        let mut sched = broker.scheduler_endpoint().unwrap();
        let mut worker = broker.worker_endpoint(OperationClass::Analysis);
        sched.publish(&task(1), OperationClass::Analysis).unwrap();

        let delivery = worker.next_delivery(WAIT).unwrap().unwrap();
        assert_eq!(delivery.task().id(), 1);
        assert_eq!(broker.unacked(), 1);
        assert!(matches!(worker.next_delivery(WAIT), Err(SchedulerError::IllegalState(_))));

        let analyzed = delivery
            .task()
            .next_version(TaskState::Ready, Some(SharedResUsage::new()))
            .unwrap();
        worker.publish_processed(&analyzed).unwrap();
        worker.ack(delivery).unwrap();
        assert_eq!(broker.unacked(), 0);

        match sched.wait_for_event(WAIT).unwrap() {
            Some(Inbound::Processed(t)) => assert_eq!(t.state(), &TaskState::Ready),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_worker_reject_dead_letters_original() {
        let broker = InMemoryBroker::new();
        let mut sched = broker.scheduler_endpoint().unwrap();
        let mut worker = broker.worker_endpoint(OperationClass::Import);
        let original = Task::new(5, 1, TaskState::Ready, Some(SharedResUsage::new())).unwrap();
        sched.publish(&original, OperationClass::Import).unwrap();

        let delivery = worker.next_delivery(WAIT).unwrap().unwrap();
        worker.reject(delivery).unwrap();

        match sched.wait_for_event(WAIT).unwrap() {
            Some(Inbound::Refused { task, refusal }) => {
                assert_eq!(task.id(), 5);
                assert_eq!(task.state(), &TaskState::Ready);
                assert_eq!(refusal, Refusal::Rejected);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_declared_queue_outlives_worker() {
        let broker = InMemoryBroker::new();
        let mut sched = broker.scheduler_endpoint().unwrap();
        drop(broker.worker_endpoint(OperationClass::Analysis));
        assert!(broker.is_declared(OperationClass::Analysis));

        sched.publish(&task(1), OperationClass::Analysis).unwrap();
        assert_eq!(broker.pending_for_workers(OperationClass::Analysis), 1);
        assert_eq!(broker.pending_for_scheduler(), 0);
    }

    #[test]
    fn test_dropped_worker_requeues_delivery() {
        let broker = InMemoryBroker::new();
        let mut sched = broker.scheduler_endpoint().unwrap();
        let mut worker = broker.worker_endpoint(OperationClass::Analysis);
        sched.publish(&task(1), OperationClass::Analysis).unwrap();
        let _delivery = worker.next_delivery(WAIT).unwrap().unwrap();
        drop(worker);

        assert_eq!(broker.unacked(), 0);
        let mut other = broker.worker_endpoint(OperationClass::Analysis);
        assert_eq!(other.next_delivery(WAIT).unwrap().unwrap().task().id(), 1);
    }

    #[test]
    fn test_malformed_bodies_surface_as_errors() {
        let broker = InMemoryBroker::new();
        let mut sched = broker.scheduler_endpoint().unwrap();
        broker.inner.route(Route::Ingress, b"{\"id\": 1}".to_vec()).unwrap();
        assert!(matches!(sched.wait_for_event(WAIT), Err(SchedulerError::Malformed(_))));

        let mut worker = broker.worker_endpoint(OperationClass::Import);
        broker
            .inner
            .route(Route::Scheduled(OperationClass::Import), b"[]".to_vec())
            .unwrap();
        assert!(matches!(worker.next_delivery(WAIT), Err(SchedulerError::Malformed(_))));
        assert!(matches!(sched.wait_for_event(WAIT), Err(SchedulerError::Malformed(_))));
    }
}

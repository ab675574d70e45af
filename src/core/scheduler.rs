//! Fair-queuing scheduler.
//!
//! Owns one [`Queue`] per owner, applies inbound messages to them and runs
//! dispatch passes that publish tasks to workers. Each pass fills the import
//! class first, then the analysis class, up to a global target per class.
//! Within a class, owners are served round-robin by how many tasks they
//! already have in flight: every owner with nothing scheduled gets one task
//! before any owner gets a second.
//!
//! The scheduler assumes all workers are idle and their queues empty when it
//! starts; there is no reliable way to synchronize with tasks published by a
//! previous instance.

use std::collections::btree_map::Entry as Slot;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::{DuplicateIngressPolicy, SchedulerConfig};
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::endpoint::{Inbound, Refusal, SchedulerEndpoint};
use crate::core::queue::Queue;
use crate::core::task::{OperationClass, OwnerId, Task};
use crate::core::SchedulerError;

/// Per-owner snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    /// Queue owner.
    pub owner_id: OwnerId,
    /// Enqueued tasks.
    pub len: usize,
    /// Tasks published for analysis.
    pub scheduled_analysis: usize,
    /// Tasks published for import.
    pub scheduled_import: usize,
}

/// Scheduler-wide snapshot over non-empty queues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Non-empty queues.
    pub active_queues: usize,
    /// Enqueued tasks across all owners.
    pub total_tasks: usize,
    /// Tasks published for analysis across all owners.
    pub scheduled_analysis: usize,
    /// Tasks published for import across all owners.
    pub scheduled_import: usize,
    /// Per-queue breakdown in owner order.
    pub queues: Vec<QueueStats>,
}

/// Tasks published by one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Published for import.
    pub import: usize,
    /// Published for analysis.
    pub analysis: usize,
}

impl DispatchReport {
    /// Total tasks published.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.import + self.analysis
    }
}

/// Fair-queuing scheduler over a messaging endpoint.
pub struct Scheduler<E> {
    endpoint: E,
    config: SchedulerConfig,
    queues: BTreeMap<OwnerId, Queue>,
    audit: Option<Box<dyn AuditSink>>,
    last_stats: Instant,
}

impl<E: SchedulerEndpoint> Scheduler<E> {
    /// Create a scheduler.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration does not validate.
    pub fn new(endpoint: E, config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::Config)?;
        Ok(Self {
            endpoint,
            config,
            queues: BTreeMap::new(),
            audit: None,
            last_stats: Instant::now(),
        })
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, sink: impl AuditSink + 'static) -> Self {
        self.audit = Some(Box::new(sink));
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Messaging endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Mutable messaging endpoint.
    pub fn endpoint_mut(&mut self) -> &mut E {
        &mut self.endpoint
    }

    /// Queue of an owner, if one was created.
    #[must_use]
    pub fn queue(&self, owner_id: OwnerId) -> Option<&Queue> {
        self.queues.get(&owner_id)
    }

    /// Enqueue a new task. An already-enqueued task is handled per the
    /// configured duplicate policy.
    ///
    /// # Errors
    ///
    /// `Duplicate` under the reject policy, plus any `Queue::append` error.
    pub fn add_task(&mut self, task: Task) -> Result<(), SchedulerError> {
        let policy = self.config.duplicate_ingress;
        let queue = self.queue_for(task.owner_id())?;
        if queue.has(task.id()) {
            warn!(
                task_id = task.id(),
                owner_id = task.owner_id(),
                state = %task.state(),
                "Attempted to enqueue duplicate task"
            );
            self.record(&task, AuditAction::Duplicate, None);
            return match policy {
                DuplicateIngressPolicy::Tolerate => Ok(()),
                DuplicateIngressPolicy::Reject => Err(SchedulerError::Duplicate { task_id: task.id() }),
            };
        }
        queue.append(task.clone())?;
        self.record(&task, AuditAction::Enqueue, None);
        Ok(())
    }

    /// Apply a worker's processed task. Completed tasks leave their queue.
    ///
    /// # Errors
    ///
    /// `NotFound` if the task is not enqueued, plus any sync error.
    pub fn on_processed(&mut self, task: Task) -> Result<(), SchedulerError> {
        let queue = self.queue_for(task.owner_id())?;
        queue.update(task.clone())?;
        let action = if queue.has(task.id()) {
            AuditAction::Update
        } else {
            AuditAction::Complete
        };
        self.record(&task, action, None);
        Ok(())
    }

    /// Apply a refused task: rejected tasks are dropped, returned ones go
    /// back to their unscheduled state.
    ///
    /// # Errors
    ///
    /// Any error from `Queue::remove` or `Queue::revert_scheduled`.
    pub fn on_refused(&mut self, task: &Task, refusal: Refusal) -> Result<(), SchedulerError> {
        let queue = self.queue_for(task.owner_id())?;
        match refusal {
            Refusal::Rejected => {
                queue.remove(task.id())?;
                self.record(task, AuditAction::Reject, None);
            }
            Refusal::Returned => {
                queue.revert_scheduled(task.id())?;
                self.record(task, AuditAction::Return, None);
            }
        }
        Ok(())
    }

    /// Route one inbound message to its handler.
    ///
    /// # Errors
    ///
    /// Whatever the handler returns.
    pub fn handle(&mut self, inbound: Inbound) -> Result<(), SchedulerError> {
        match inbound {
            Inbound::Ingress(task) => {
                info!(task_id = task.id(), owner_id = task.owner_id(), state = %task.state(), "Got new task");
                self.add_task(task)
            }
            Inbound::Processed(task) => {
                info!(task_id = task.id(), owner_id = task.owner_id(), state = %task.state(), "Got update for task");
                self.on_processed(task)
            }
            Inbound::Refused { task, refusal } => {
                warn!(
                    task_id = task.id(),
                    owner_id = task.owner_id(),
                    state = %task.state(),
                    refusal = refusal.as_str(),
                    "Got refused task"
                );
                self.on_refused(&task, refusal)
            }
        }
    }

    /// Enqueue tasks recovered from the source of truth before the event loop
    /// starts. Terminal tasks are skipped. Returns how many were enqueued.
    ///
    /// # Errors
    ///
    /// Stops at the first task that cannot be enqueued.
    pub fn recover<I>(&mut self, tasks: I) -> Result<usize, SchedulerError>
    where
        I: IntoIterator<Item = Task>,
    {
        let mut recovered = 0;
        for task in tasks {
            if task.state().is_terminal() {
                debug!(task_id = task.id(), state = %task.state(), "Skipping terminal task during recovery");
                continue;
            }
            let owner = task.owner_id();
            let id = task.id();
            let known = self.queues.get(&owner).is_some_and(|q| q.has(id));
            self.add_task(task)?;
            if !known {
                recovered += 1;
            }
        }
        info!(recovered, "Recovered tasks");
        Ok(recovered)
    }

    /// Run one dispatch pass: import round, then analysis round.
    ///
    /// # Errors
    ///
    /// Publish failures and queue invariant violations.
    pub fn dispatch(&mut self) -> Result<DispatchReport, SchedulerError> {
        let mut owners = Vec::new();
        let (mut scheduled_analysis, mut scheduled_import) = (0, 0);
        for (&owner, queue) in &mut self.queues {
            if queue.is_empty() {
                continue;
            }
            queue.reset_cursor();
            scheduled_analysis += queue.scheduled_analysis();
            scheduled_import += queue.scheduled_import();
            owners.push(owner);
        }

        info!(
            scheduled_analysis,
            target_analysis = self.config.target_analysis,
            scheduled_import,
            target_import = self.config.target_import,
            non_empty_queues = owners.len(),
            "Going to publish new tasks for workers"
        );

        // Ready tasks sit at queue heads, so imports go first.
        let import = self.dispatch_class(OperationClass::Import, &owners, scheduled_import)?;
        let analysis = self.dispatch_class(OperationClass::Analysis, &owners, scheduled_analysis)?;
        Ok(DispatchReport { import, analysis })
    }

    fn dispatch_class(
        &mut self,
        class: OperationClass,
        owners: &[OwnerId],
        mut scheduled: usize,
    ) -> Result<usize, SchedulerError> {
        let target = match class {
            OperationClass::Analysis => self.config.target_analysis,
            OperationClass::Import => self.config.target_import,
        };
        let mut valid = owners.to_vec();
        let mut published = 0;
        let mut iter = 0;

        while scheduled < target && !valid.is_empty() {
            let mut i = 0;
            while i < valid.len() && scheduled < target {
                let owner = valid[i];
                let queue = self.queues.get_mut(&owner).ok_or_else(|| {
                    SchedulerError::IllegalState(format!("queue for owner #{owner} vanished"))
                })?;
                let in_flight = queue.scheduled_count(class);
                if in_flight > iter {
                    debug!(owner_id = owner, %class, in_flight, iter, "Skipping queue this round");
                    i += 1;
                    continue;
                }
                let Some(task) = queue.next_for(class)? else {
                    // End of queue or traversal limit.
                    valid.remove(i);
                    continue;
                };
                debug!(task_id = task.id(), owner_id = owner, %class, state = %task.state(), "Publishing task");
                self.endpoint.publish(&task, class)?;
                queue.mark_scheduled(task.id())?;
                scheduled += 1;
                published += 1;
                self.record(&task, AuditAction::Publish, Some(class));
                i += 1;
            }
            iter += 1;
        }

        info!(
            %class,
            published,
            scheduled,
            target,
            valid_queues = valid.len(),
            "Done processing queues"
        );
        Ok(published)
    }

    /// Drain up to `max_events_per_cycle` inbound messages, then dispatch if
    /// anything arrived. Returns whether any message was handled.
    ///
    /// Undecodable messages, out-of-range values and duplicate ingress are
    /// logged and dropped; the queue they targeted is unchanged.
    ///
    /// # Errors
    ///
    /// Transport failures, dispatch failures and any other handler error
    /// (unknown task, illegal task state, illegal transition, missing shared
    /// resource declaration, counter underflow).
    pub fn run_cycle(&mut self) -> Result<bool, SchedulerError> {
        let wait = self.config.poll_interval();
        let mut had_events = false;
        for _ in 0..self.config.max_events_per_cycle {
            let inbound = match self.endpoint.wait_for_event(wait) {
                Ok(Some(inbound)) => inbound,
                Ok(None) => break,
                Err(err) if err.is_boundary_rejection() => {
                    warn!(error = %err, "Dropping undecodable message");
                    had_events = true;
                    continue;
                }
                Err(err) => return Err(err),
            };
            had_events = true;
            let task_id = inbound.task().id();
            match self.handle(inbound) {
                Ok(()) => {}
                Err(err) if err.is_boundary_rejection() || matches!(err, SchedulerError::Duplicate { .. }) => {
                    warn!(task_id, error = %err, "Message rejected");
                }
                Err(err) => {
                    error!(task_id, error = %err, "Queue invariant violated, stopping");
                    return Err(err);
                }
            }
        }
        if had_events {
            self.dispatch()?;
        }
        Ok(had_events)
    }

    /// Run the event loop forever.
    ///
    /// # Errors
    ///
    /// See [`run_cycle`](Self::run_cycle).
    pub fn run(&mut self) -> Result<(), SchedulerError> {
        self.run_until(&AtomicBool::new(false))
    }

    /// Dispatch recovered work, then run cycles until `stop` is set.
    ///
    /// # Errors
    ///
    /// See [`run_cycle`](Self::run_cycle).
    pub fn run_until(&mut self, stop: &AtomicBool) -> Result<(), SchedulerError> {
        info!(
            target_analysis = self.config.target_analysis,
            target_import = self.config.target_import,
            "Scheduler started"
        );
        self.dispatch()?;
        self.last_stats = Instant::now();
        while !stop.load(Ordering::Acquire) {
            self.run_cycle()?;
            if let Some(interval) = self.config.stats_interval() {
                if self.last_stats.elapsed() >= interval {
                    self.log_stats();
                    self.last_stats = Instant::now();
                }
            }
        }
        info!("Scheduler stopped");
        Ok(())
    }

    /// Snapshot of all non-empty queues.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        for (&owner_id, queue) in &self.queues {
            if queue.is_empty() {
                continue;
            }
            let q = QueueStats {
                owner_id,
                len: queue.len(),
                scheduled_analysis: queue.scheduled_analysis(),
                scheduled_import: queue.scheduled_import(),
            };
            stats.active_queues += 1;
            stats.total_tasks += q.len;
            stats.scheduled_analysis += q.scheduled_analysis;
            stats.scheduled_import += q.scheduled_import;
            stats.queues.push(q);
        }
        stats
    }

    /// Log a statistics snapshot.
    pub fn log_stats(&self) {
        let stats = self.stats();
        if stats.active_queues == 0 {
            info!("No active queues, idling");
            return;
        }
        for q in &stats.queues {
            info!(
                owner_id = q.owner_id,
                len = q.len,
                scheduled_analysis = q.scheduled_analysis,
                scheduled_import = q.scheduled_import,
                "Queue stats"
            );
        }
        info!(
            active_queues = stats.active_queues,
            tasks = stats.total_tasks,
            scheduled_analysis = stats.scheduled_analysis,
            scheduled_import = stats.scheduled_import,
            "Scheduler stats"
        );
    }

    fn queue_for(&mut self, owner_id: OwnerId) -> Result<&mut Queue, SchedulerError> {
        match self.queues.entry(owner_id) {
            Slot::Occupied(slot) => Ok(slot.into_mut()),
            Slot::Vacant(slot) => {
                let queue = Queue::with_depths(
                    owner_id,
                    self.config.traversal_depth_analysis,
                    self.config.traversal_depth_import,
                )?;
                Ok(slot.insert(queue))
            }
        }
    }

    fn record(&mut self, task: &Task, action: AuditAction, class: Option<OperationClass>) {
        if let Some(sink) = self.audit.as_mut() {
            sink.record(build_audit_event(task, action, class));
        }
    }
}

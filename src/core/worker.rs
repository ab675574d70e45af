//! Worker harness: consumes one class of tasks and reports results.
//!
//! Each worker owns a single-threaded tokio runtime and drives its handler
//! with `block_on`, so handler work never lands on a shared async runtime.
//! Workers hold at most one unacknowledged delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::core::endpoint::WorkerEndpoint;
use crate::core::handler::TaskHandler;
use crate::core::task::{Task, TaskId};
use crate::core::SchedulerError;

/// Limits after which a worker stops taking tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Safeguard {
    max_memory_bytes: Option<u64>,
    max_runtime: Option<Duration>,
    max_tasks: Option<u64>,
}

impl Safeguard {
    /// Safeguard without limits.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self { max_memory_bytes: None, max_runtime: None, max_tasks: None }
    }

    /// Safeguard with optional runtime and task-count limits.
    #[must_use]
    pub const fn new(max_runtime: Option<Duration>, max_tasks: Option<u64>) -> Self {
        Self { max_memory_bytes: None, max_runtime, max_tasks }
    }

    /// Add a limit on the process's resident memory, in MiB.
    #[must_use]
    pub const fn with_max_memory_mib(mut self, mib: u64) -> Self {
        self.max_memory_bytes = Some(mib.saturating_mul(1024 * 1024));
        self
    }

    /// Safeguard configured from worker settings.
    #[must_use]
    pub fn from_config(config: &WorkerConfig) -> Self {
        let sg = Self::new(config.max_runtime_secs.map(Duration::from_secs), config.max_tasks);
        match config.max_memory_mib {
            Some(mib) => sg.with_max_memory_mib(mib),
            None => sg,
        }
    }

    /// Whether any limit has been reached. The memory limit is checked
    /// against current resident memory and is skipped on platforms where it
    /// cannot be read.
    #[must_use]
    pub fn is_limit_exceeded(&self, runtime: Duration, tasks_handled: u64) -> bool {
        let resident = self
            .max_memory_bytes
            .and_then(|_| memory_stats::memory_stats())
            .map(|usage| usage.physical_mem as u64);
        self.exceeds(resident, runtime, tasks_handled)
    }

    fn exceeds(&self, resident_bytes: Option<u64>, runtime: Duration, tasks_handled: u64) -> bool {
        self.max_memory_bytes
            .zip(resident_bytes)
            .is_some_and(|(max, used)| used >= max)
            || self.max_runtime.is_some_and(|max| runtime >= max)
            || self.max_tasks.is_some_and(|max| tasks_handled >= max)
    }
}

/// Result of handling one delivery.
#[derive(Debug)]
pub enum WorkOutcome {
    /// Handler succeeded; the new version was reported and the delivery acked.
    Processed(Task),
    /// Handler gave up; the delivery was rejected.
    Rejected(TaskId),
}

/// Why a worker loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The stop flag was set.
    Stopped,
    /// A safeguard limit was reached.
    SafeguardTripped,
}

/// Task worker bound to one endpoint and handler.
pub struct Worker<W, H> {
    endpoint: W,
    handler: H,
    runtime: tokio::runtime::Runtime,
    safeguard: Safeguard,
    poll_interval: Duration,
    started: Instant,
    tasks_handled: u64,
}

impl<W, H> Worker<W, H>
where
    W: WorkerEndpoint,
    H: TaskHandler,
{
    /// Create a worker with its own current-thread runtime.
    ///
    /// # Errors
    ///
    /// `Config` for invalid settings, `Runtime` if the runtime cannot be built.
    pub fn new(endpoint: W, handler: H, config: &WorkerConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::Config)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SchedulerError::Runtime(format!("failed to create worker runtime: {e}")))?;
        Ok(Self {
            endpoint,
            handler,
            runtime,
            safeguard: Safeguard::from_config(config),
            poll_interval: config.poll_interval(),
            started: Instant::now(),
            tasks_handled: 0,
        })
    }

    /// Tasks handled so far, successful or not.
    #[must_use]
    pub const fn tasks_handled(&self) -> u64 {
        self.tasks_handled
    }

    /// Worker endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &W {
        &self.endpoint
    }

    /// Wait at most `wait` for a delivery and handle it.
    ///
    /// # Errors
    ///
    /// Endpoint failures, including undecodable deliveries.
    pub fn process_next(&mut self, wait: Duration) -> Result<Option<WorkOutcome>, SchedulerError> {
        let Some(delivery) = self.endpoint.next_delivery(wait)? else {
            return Ok(None);
        };
        let task = delivery.task().clone();
        let class = self.endpoint.class();
        info!(task_id = task.id(), owner_id = task.owner_id(), state = %task.state(), %class, "Got new task");

        let result = self.runtime.block_on(self.handler.handle(task.clone(), class));
        self.tasks_handled += 1;

        let failure = match result {
            Ok(processed) if processed.id() == task.id() => {
                self.endpoint.publish_processed(&processed)?;
                self.endpoint.ack(delivery)?;
                info!(
                    task_id = processed.id(),
                    owner_id = processed.owner_id(),
                    state = %processed.state(),
                    "Done processing task"
                );
                return Ok(Some(WorkOutcome::Processed(processed)));
            }
            Ok(other) => format!("handler returned task #{} for task #{}", other.id(), task.id()),
            Err(err) => err.to_string(),
        };
        error!(task_id = task.id(), owner_id = task.owner_id(), error = %failure, "FATAL: rejecting task");
        self.endpoint.reject(delivery)?;
        Ok(Some(WorkOutcome::Rejected(task.id())))
    }

    /// Handle deliveries until `stop` is set or a safeguard limit trips.
    ///
    /// # Errors
    ///
    /// Endpoint failures other than undecodable deliveries.
    pub fn run_until(&mut self, stop: &AtomicBool) -> Result<WorkerExit, SchedulerError> {
        info!(class = %self.endpoint.class(), "Worker started");
        while !stop.load(Ordering::Acquire) {
            match self.process_next(self.poll_interval) {
                Ok(None) => continue,
                Ok(Some(_)) => {}
                Err(err) if err.is_boundary_rejection() => {
                    warn!(error = %err, "Dropped undecodable delivery");
                }
                Err(err) => return Err(err),
            }
            let runtime = self.started.elapsed();
            if self.safeguard.is_limit_exceeded(runtime, self.tasks_handled) {
                warn!(
                    runtime_secs = runtime.as_secs(),
                    tasks_handled = self.tasks_handled,
                    "Terminating due to exceeding safeguard limit"
                );
                return Ok(WorkerExit::SafeguardTripped);
            }
            debug!(runtime_secs = runtime.as_secs(), tasks_handled = self.tasks_handled, "Worker running");
        }
        info!(tasks_handled = self.tasks_handled, "Worker stopped");
        Ok(WorkerExit::Stopped)
    }
}

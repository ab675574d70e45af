//! Run the scheduler and workers on dedicated OS threads.
//!
//! All loops share one stop flag; setting it makes every loop return after
//! its current poll interval.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use crate::core::{Scheduler, SchedulerEndpoint, SchedulerError};
#[cfg(feature = "tokio-runtime")]
use crate::config::WorkerConfig;
#[cfg(feature = "tokio-runtime")]
use crate::core::{TaskHandler, Worker, WorkerEndpoint, WorkerExit};

/// Handle to the scheduler thread. Joining yields the scheduler back.
pub type SchedulerHandle<E> = JoinHandle<Result<Scheduler<E>, SchedulerError>>;

/// Handle to one worker thread.
#[cfg(feature = "tokio-runtime")]
pub type WorkerHandle = JoinHandle<Result<WorkerExit, SchedulerError>>;

/// Run `scheduler` on a thread named `fairq-scheduler` until `stop` is set.
///
/// # Errors
///
/// `Runtime` if the thread cannot be spawned.
pub fn spawn_scheduler<E>(
    mut scheduler: Scheduler<E>,
    stop: Arc<AtomicBool>,
) -> Result<SchedulerHandle<E>, SchedulerError>
where
    E: SchedulerEndpoint + 'static,
{
    thread::Builder::new()
        .name("fairq-scheduler".into())
        .spawn(move || {
            debug!("Scheduler thread started");
            if let Err(err) = scheduler.run_until(&stop) {
                error!(error = %err, "Scheduler loop failed");
                return Err(err);
            }
            Ok(scheduler)
        })
        .map_err(|e| SchedulerError::Runtime(format!("failed to spawn scheduler thread: {e}")))
}

/// Spawn `config.worker_count` workers for one class. `make_endpoint` is
/// called once per worker with its index; each worker gets a clone of
/// `handler` and builds its own runtime on its thread.
///
/// # Errors
///
/// `Config` for invalid settings, `Runtime` if a thread cannot be spawned.
#[cfg(feature = "tokio-runtime")]
pub fn spawn_workers<W, H, F>(
    config: &WorkerConfig,
    mut make_endpoint: F,
    handler: &H,
    stop: &Arc<AtomicBool>,
) -> Result<Vec<WorkerHandle>, SchedulerError>
where
    W: WorkerEndpoint + 'static,
    H: TaskHandler,
    F: FnMut(usize) -> W,
{
    config.validate().map_err(SchedulerError::Config)?;
    let mut handles = Vec::with_capacity(config.worker_count);
    for worker_id in 0..config.worker_count {
        let endpoint = make_endpoint(worker_id);
        let class = endpoint.class();
        let handler = handler.clone();
        let config = config.clone();
        let stop = Arc::clone(stop);
        let handle = thread::Builder::new()
            .name(format!("fairq-{class}-{worker_id}"))
            .spawn(move || {
                debug!(worker_id, %class, "Worker thread started");
                let mut worker = Worker::new(endpoint, handler, &config).map_err(|err| {
                    error!(worker_id, error = %err, "Failed to create worker");
                    err
                })?;
                let exit = worker.run_until(&stop);
                debug!(worker_id, ?exit, "Worker thread exiting");
                exit
            })
            .map_err(|e| SchedulerError::Runtime(format!("failed to spawn worker thread: {e}")))?;
        handles.push(handle);
    }
    Ok(handles)
}

//! # fairq
//!
//! A fair-queuing task scheduler that sits between task producers and a pool
//! of workers, talking to both through a message broker.
//!
//! Every task belongs to an owner (a tenant). The scheduler keeps one ordered
//! queue per owner and decides which tasks may be in flight at any moment:
//!
//! - **Fairness**: owners are served round-robin by how many tasks they
//!   already have in flight, up to a global target per operation class.
//! - **Order preservation**: within an owner, tasks are imported in arrival
//!   order; an import never overtakes a task that has not been analyzed yet.
//! - **Conflict freedom**: tasks declare shared resources they touch, and no
//!   two in-flight imports may disagree over exclusive access.
//!
//! ## Lifecycle
//!
//! A task arrives `new` and is published for **analysis**. The analysis
//! worker returns it `ready` with its shared resource usage declaration. It
//! is then published for **import** once no earlier task blocks it, and the
//! import worker returns it in a terminal state (`done`, `error`, ...), at
//! which point it leaves the queue.
//!
//! ```rust,ignore
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! use fairq::builders::SchedulerBuilder;
//! use fairq::config::WorkerConfig;
//! use fairq::core::OperationClass;
//! use fairq::infra::InMemoryBroker;
//! use fairq::runtime::{spawn_scheduler, spawn_workers};
//!
//! let broker = InMemoryBroker::new();
//! let stop = Arc::new(AtomicBool::new(false));
//!
//! let analysis = spawn_workers(
//!     &WorkerConfig::new().with_worker_count(4),
//!     |_| broker.worker_endpoint(OperationClass::Analysis),
//!     &my_analyzer,
//!     &stop,
//! )?;
//! let scheduler = SchedulerBuilder::from_env()?.build(broker.scheduler_endpoint()?)?;
//! let scheduler = spawn_scheduler(scheduler, Arc::clone(&stop))?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Scheduling engine: tasks, queues, cursors, dispatcher and worker harness.
pub mod core;
/// Configuration models for the scheduler and workers.
pub mod config;
/// Builders to construct the scheduler from configuration.
pub mod builders;
/// Infrastructure adapters for the messaging boundary.
pub mod infra;
/// Runtime adapters running loops on OS threads.
pub mod runtime;
/// Shared utilities.
pub mod util;

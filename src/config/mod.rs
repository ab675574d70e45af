//! Configuration models for the scheduler and worker harness.

pub mod scheduler;

pub use scheduler::{DuplicateIngressPolicy, SchedulerConfig, WorkerConfig};

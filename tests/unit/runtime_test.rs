//! Tests for runtime adapters

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use fairq::builders::SchedulerBuilder;
use fairq::config::WorkerConfig;
use fairq::core::{
    OperationClass, SchedulerError, SharedResUsage, Task, TaskHandler, TaskState,
    TaskUnprocessable, WorkerExit,
};
use fairq::infra::InMemoryBroker;
use fairq::runtime::{spawn_scheduler, spawn_workers};

#[derive(Clone)]
struct Analyzer;

#[async_trait]
impl TaskHandler for Analyzer {
    async fn handle(&self, task: Task, _class: OperationClass) -> Result<Task, TaskUnprocessable> {
        Ok(task
            .next_version(TaskState::Ready, Some(SharedResUsage::new()))
            .unwrap())
    }
}

fn new_task(id: u64, owner: u64) -> Task {
    Task::new(id, owner, TaskState::New, None).unwrap()
}

#[test]
fn test_spawn_scheduler_dispatches_recovered_tasks() {
    let broker = InMemoryBroker::new();
    let _declare = broker.worker_endpoint(OperationClass::Analysis);
    let mut scheduler = SchedulerBuilder::new()
        .with_targets(2, 2)
        .build(broker.scheduler_endpoint().unwrap())
        .unwrap();
    let recovered = scheduler
        .recover(vec![
            new_task(1, 1),
            new_task(2, 1),
            new_task(3, 2),
            Task::new(4, 2, TaskState::Done, None).unwrap(),
        ])
        .unwrap();
    assert_eq!(recovered, 3);

    let stop = Arc::new(AtomicBool::new(true));
    let handle = spawn_scheduler(scheduler, stop).unwrap();
    assert_eq!(handle.thread().name(), Some("fairq-scheduler"));
    let scheduler = handle.join().unwrap().unwrap();

    assert_eq!(broker.pending_for_workers(OperationClass::Analysis), 2);
    let stats = scheduler.stats();
    assert_eq!(stats.total_tasks, 3);
    assert_eq!(stats.scheduled_analysis, 2);
}

#[test]
fn test_spawn_workers_stop_immediately() {
    let broker = InMemoryBroker::new();
    let stop = Arc::new(AtomicBool::new(true));
    let handles = spawn_workers(
        &WorkerConfig::new().with_worker_count(3),
        |_| broker.worker_endpoint(OperationClass::Analysis),
        &Analyzer,
        &stop,
    )
    .unwrap();

    assert_eq!(handles.len(), 3);
    for handle in handles {
        assert!(matches!(handle.join().unwrap(), Ok(WorkerExit::Stopped)));
    }
    assert!(broker.is_declared(OperationClass::Analysis));
}

#[test]
fn test_spawn_workers_rejects_invalid_config() {
    let broker = InMemoryBroker::new();
    let stop = Arc::new(AtomicBool::new(false));
    let result = spawn_workers(
        &WorkerConfig::new().with_worker_count(0),
        |_| broker.worker_endpoint(OperationClass::Import),
        &Analyzer,
        &stop,
    );
    assert!(matches!(result, Err(SchedulerError::Config(_))));
}

#[test]
fn test_worker_safeguard_trips_after_max_tasks() {
    let broker = InMemoryBroker::new();
    let stop = Arc::new(AtomicBool::new(false));
    let handles = spawn_workers(
        &WorkerConfig::new().with_worker_count(1).with_max_tasks(1),
        |_| broker.worker_endpoint(OperationClass::Analysis),
        &Analyzer,
        &stop,
    )
    .unwrap();

    let mut scheduler = SchedulerBuilder::new().build(broker.scheduler_endpoint().unwrap()).unwrap();
    scheduler.add_task(new_task(1, 1)).unwrap();
    scheduler.dispatch().unwrap();

    for handle in handles {
        assert!(matches!(handle.join().unwrap(), Ok(WorkerExit::SafeguardTripped)));
    }
    assert!(scheduler.run_cycle().unwrap());
    let queue = scheduler.queue(1).unwrap();
    assert_eq!(queue.scheduled_analysis(), 0);
    assert_eq!(queue.tasks().next().unwrap().state(), &TaskState::Ready);
}

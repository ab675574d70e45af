//! Tests for builders

use fairq::builders::SchedulerBuilder;
use fairq::config::{DuplicateIngressPolicy, SchedulerConfig};
use fairq::core::{AuditAction, InMemoryAuditSink, SchedulerError, Task, TaskState};
use fairq::infra::InMemoryBroker;

#[test]
fn test_builder_applies_settings() {
    let builder = SchedulerBuilder::new()
        .with_targets(4, 2)
        .with_traversal_depths(10, 5)
        .with_duplicate_ingress(DuplicateIngressPolicy::Reject);

    let cfg = builder.config();
    assert_eq!(cfg.target_analysis, 4);
    assert_eq!(cfg.target_import, 2);
    assert_eq!(cfg.traversal_depth_analysis, 10);
    assert_eq!(cfg.traversal_depth_import, 5);
    assert_eq!(cfg.duplicate_ingress, DuplicateIngressPolicy::Reject);
}

#[test]
fn test_builder_rejects_invalid_config() {
    let broker = InMemoryBroker::new();
    let result = SchedulerBuilder::new()
        .with_targets(0, 4)
        .build(broker.scheduler_endpoint().unwrap());
    assert!(matches!(result, Err(SchedulerError::Config(_))));

    // The failed build dropped the endpoint and released the claim.
    assert!(broker.scheduler_endpoint().is_ok());
}

#[test]
fn test_builder_with_config_and_audit() {
    let broker = InMemoryBroker::new();
    let audit = InMemoryAuditSink::new(100);
    let config = SchedulerConfig { target_analysis: 1, ..SchedulerConfig::default() };

    let mut scheduler = SchedulerBuilder::new()
        .with_config(config)
        .with_audit(audit.clone())
        .build(broker.scheduler_endpoint().unwrap())
        .unwrap();
    assert_eq!(scheduler.config().target_analysis, 1);

    scheduler.add_task(Task::new(1, 1, TaskState::New, None).unwrap()).unwrap();
    scheduler.add_task(Task::new(2, 1, TaskState::New, None).unwrap()).unwrap();
    let report = scheduler.dispatch().unwrap();
    assert_eq!(report.analysis, 1);

    let actions: Vec<AuditAction> = audit.events().iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::Enqueue, AuditAction::Enqueue, AuditAction::Publish]
    );
    // No analysis queue is declared, so the publish comes back as returned.
    assert_eq!(broker.pending_for_scheduler(), 1);
}

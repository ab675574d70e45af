//! Tests for audit sink

use fairq::core::{
    build_audit_event, AuditAction, AuditSink, InMemoryAuditSink, OperationClass, SharedResUsage,
    Task, TaskState,
};

fn task(id: u64) -> Task {
    Task::new(id, 2, TaskState::New, None).unwrap()
}

#[test]
fn test_build_audit_event() {
    let ready = Task::new(1, 2, TaskState::Ready, Some(SharedResUsage::new())).unwrap();
    let event = build_audit_event(&ready, AuditAction::Publish, Some(OperationClass::Import));

    assert_eq!(event.task_id, 1);
    assert_eq!(event.owner_id, 2);
    assert_eq!(event.action, AuditAction::Publish);
    assert_eq!(event.class, Some(OperationClass::Import));
    assert_eq!(event.state, "ready");
    assert!(!event.event_id.is_empty());
    assert!(event.created_at_ms > 0);

    let other = build_audit_event(&ready, AuditAction::Publish, Some(OperationClass::Import));
    assert_ne!(event.event_id, other.event_id);
}

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);
    sink.record(build_audit_event(&task(1), AuditAction::Enqueue, None));
    sink.record(build_audit_event(&task(2), AuditAction::Enqueue, None));
    sink.record(build_audit_event(&task(1), AuditAction::Publish, Some(OperationClass::Analysis)));

    assert_eq!(sink.events().len(), 3);
    let actions: Vec<AuditAction> = sink.events_for(1).iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::Enqueue, AuditAction::Publish]);
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);
    for id in 1..=3 {
        sink.record(build_audit_event(&task(id), AuditAction::Enqueue, None));
    }

    let ids: Vec<u64> = sink.events().iter().map(|e| e.task_id).collect();
    assert_eq!(ids, vec![2, 3]);
}

#[test]
fn test_zero_capacity_sink_drops_everything() {
    let mut sink = InMemoryAuditSink::new(0);
    sink.record(build_audit_event(&task(1), AuditAction::Enqueue, None));
    assert!(sink.events().is_empty());
}

#[test]
fn test_clones_share_buffer() {
    let sink = InMemoryAuditSink::new(10);
    let mut boxed: Box<dyn AuditSink> = Box::new(sink.clone());
    boxed.record(build_audit_event(&task(1), AuditAction::Reject, None));

    assert_eq!(sink.events().len(), 1);
    assert_eq!(sink.events()[0].action.to_string(), "reject");
}

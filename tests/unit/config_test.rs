//! Tests for configuration

use std::time::Duration;

use fairq::config::{DuplicateIngressPolicy, SchedulerConfig, WorkerConfig};

#[test]
fn test_scheduler_config_from_json() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "target_analysis": 8,
            "target_import": 4,
            "traversal_depth_import": 5,
            "poll_interval_ms": 10,
            "stats_interval_secs": 0
        }"#,
    )
    .unwrap();

    assert_eq!(cfg.target_analysis, 8);
    assert_eq!(cfg.target_import, 4);
    assert_eq!(cfg.traversal_depth_import, 5);
    assert_eq!(cfg.traversal_depth_analysis, 50);
    assert_eq!(cfg.poll_interval(), Duration::from_millis(10));
    assert_eq!(cfg.stats_interval(), None);
}

#[test]
fn test_scheduler_config_validation() {
    let err = SchedulerConfig::from_json_str(r#"{"target_import": 0}"#).unwrap_err();
    assert!(err.contains("target_import"));

    let err = SchedulerConfig::from_json_str(r#"{"traversal_depth_analysis": 0}"#).unwrap_err();
    assert!(err.contains("traversal_depth_analysis"));

    let err = SchedulerConfig::from_json_str("not json").unwrap_err();
    assert!(err.starts_with("parse error"));

    let cfg = SchedulerConfig { max_events_per_cycle: 0, ..SchedulerConfig::default() };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_scheduler_config_from_env() {
    const KEYS: [&str; 3] = ["FAIRQ_TARGET_IMPORT", "FAIRQ_DUPLICATE_INGRESS", "FAIRQ_POLL_INTERVAL_MS"];

    std::env::set_var("FAIRQ_TARGET_IMPORT", "3");
    std::env::set_var("FAIRQ_DUPLICATE_INGRESS", "reject");
    std::env::set_var("FAIRQ_POLL_INTERVAL_MS", " 25 ");
    let cfg = SchedulerConfig::from_env().unwrap();
    assert_eq!(cfg.target_import, 3);
    assert_eq!(cfg.target_analysis, 16);
    assert_eq!(cfg.duplicate_ingress, DuplicateIngressPolicy::Reject);
    assert_eq!(cfg.poll_interval_ms, 25);

    std::env::set_var("FAIRQ_TARGET_IMPORT", "many");
    assert!(SchedulerConfig::from_env().is_err());

    std::env::set_var("FAIRQ_TARGET_IMPORT", "0");
    assert!(SchedulerConfig::from_env().is_err());

    std::env::set_var("FAIRQ_TARGET_IMPORT", "3");
    std::env::set_var("FAIRQ_DUPLICATE_INGRESS", "ignore");
    assert!(SchedulerConfig::from_env().is_err());

    for key in KEYS {
        std::env::remove_var(key);
    }
}

#[test]
fn test_worker_config_builder() {
    let cfg = WorkerConfig::new()
        .with_worker_count(3)
        .with_max_runtime_secs(60)
        .with_max_tasks(100);

    assert_eq!(cfg.worker_count, 3);
    assert_eq!(cfg.max_runtime_secs, Some(60));
    assert_eq!(cfg.max_tasks, Some(100));
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.poll_interval(), Duration::from_millis(100));
}

#[test]
fn test_worker_config_validation() {
    assert!(WorkerConfig::new().with_worker_count(0).validate().is_err());
    assert!(WorkerConfig::new().with_max_tasks(0).validate().is_err());
    assert!(WorkerConfig::new().with_max_runtime_secs(0).validate().is_err());
    assert!(WorkerConfig::new().with_max_memory_mib(0).validate().is_err());
    assert_eq!(WorkerConfig::new().with_max_memory_mib(256).max_memory_mib, Some(256));

    let cfg = WorkerConfig::from_json_str(r#"{"worker_count": 2, "max_tasks": 10}"#).unwrap();
    assert_eq!(cfg.worker_count, 2);
    assert_eq!(cfg.max_tasks, Some(10));
    assert_eq!(cfg.max_runtime_secs, None);
    assert_eq!(cfg.max_memory_mib, None);
    assert!(WorkerConfig::from_json_str(r#"{"poll_interval_ms": 0}"#).is_err());
}

//! Tests for error types

use fairq::core::{SchedulerError, TaskState, TaskUnprocessable, UnprocessableReason};

#[test]
fn test_error_display() {
    let err = SchedulerError::NotFound { task_id: 7 };
    assert_eq!(err.to_string(), "there is no task #7 in this queue");

    let err = SchedulerError::Duplicate { task_id: 3 };
    assert_eq!(err.to_string(), "task #3 is already enqueued");

    let err = SchedulerError::IllegalTaskState { task_id: 5, state: TaskState::Analyzing };
    assert_eq!(err.to_string(), "task #5 is in illegal state `analyzing`");

    let err = SchedulerError::SharedResourceInfoMissing { task_id: 9 };
    assert!(err.to_string().contains("#9"));

    let err = SchedulerError::CounterUnderflow("import");
    assert_eq!(err.to_string(), "scheduled counter underflow: import");
}

#[test]
fn test_boundary_rejections() {
    assert!(SchedulerError::InvalidArgument("x".into()).is_boundary_rejection());
    assert!(SchedulerError::Malformed("x".into()).is_boundary_rejection());
    assert!(!SchedulerError::NotFound { task_id: 1 }.is_boundary_rejection());
    assert!(!SchedulerError::Duplicate { task_id: 1 }.is_boundary_rejection());
    assert!(!SchedulerError::IllegalState("x".into()).is_boundary_rejection());
}

#[test]
fn test_unprocessable_display() {
    let err = TaskUnprocessable {
        task_id: 9,
        state: TaskState::Ready,
        reason: UnprocessableReason::Missing,
    };
    assert_eq!(
        err.to_string(),
        "task #9 is unprocessable: underlying file is absent in storage"
    );

    let err = TaskUnprocessable {
        task_id: 4,
        state: TaskState::New,
        reason: UnprocessableReason::InvalidState,
    };
    assert!(err.to_string().contains("task arrived as new"));

    let err = TaskUnprocessable {
        task_id: 4,
        state: TaskState::New,
        reason: UnprocessableReason::Other("disk full".into()),
    };
    assert_eq!(err.to_string(), "task #4 is unprocessable: disk full");
}

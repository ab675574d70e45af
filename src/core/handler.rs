//! Worker-side task handling trait.

use async_trait::async_trait;

use crate::core::error::TaskUnprocessable;
use crate::core::task::{OperationClass, Task};

/// Business logic a worker runs for each delivered task.
///
/// The handler receives the task as the scheduler published it and returns
/// the next version of the same task (for example `Ready` with its shared
/// resource usage after analysis, or `Done` after import). Returning
/// [`TaskUnprocessable`] makes the worker reject the delivery, which sends
/// the original task back to the scheduler as rejected.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use fairq::core::{OperationClass, SharedResUsage, Task, TaskHandler, TaskState, TaskUnprocessable};
///
/// #[derive(Clone)]
/// struct Analyzer;
///
/// #[async_trait]
/// impl TaskHandler for Analyzer {
///     async fn handle(&self, task: Task, _class: OperationClass) -> Result<Task, TaskUnprocessable> {
///         let sru = SharedResUsage::new().with("catalog", false);
///         Ok(task.next_version(TaskState::Ready, Some(sru)).expect("valid state"))
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync + Clone + 'static {
    /// Process one task and return its next version.
    async fn handle(&self, task: Task, class: OperationClass) -> Result<Task, TaskUnprocessable>;
}

//! Task record and its JSON wire format.
//!
//! A [`Task`] is a value object: every state transition produces a new
//! instance, and instances travel between processes as
//! `{"id": int, "ownerID": int, "state": string, "sru": object|null}`.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

/// Globally unique task identifier.
pub type TaskId = u64;

/// Tenant identifier; every owner gets its own fairness-isolated queue.
pub type OwnerId = u64;

/// Shared resource identifier.
pub type ResourceId = String;

/// External task state.
///
/// Values are owned by the task producers; the scheduler only compares them.
/// Transitional states (`Analyzing`, `Importing`) exist on the worker side and
/// must never reach the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TaskState {
    /// Freshly ingested, not analyzed yet.
    New,
    /// Being analyzed by a worker.
    Analyzing,
    /// Analyzed, shared resource usage known, waiting for import.
    Ready,
    /// Being imported by a worker.
    Importing,
    /// Imported successfully.
    Done,
    /// Processing failed.
    Error,
    /// Data configuration required before processing can continue.
    DataCfgRequired,
    /// Processing configuration required before processing can continue.
    ProcessingCfgRequired,
    /// Any other producer-defined state.
    Other(String),
}

impl TaskState {
    /// Parse a wire state string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the string is empty after trimming.
    pub fn parse(raw: &str) -> Result<Self, SchedulerError> {
        let state = match raw.trim() {
            "" => return Err(SchedulerError::InvalidArgument("no task state given".into())),
            "new" => Self::New,
            "analyzing" => Self::Analyzing,
            "ready" => Self::Ready,
            "importing" => Self::Importing,
            "done" => Self::Done,
            "error" => Self::Error,
            "dcfg_req" => Self::DataCfgRequired,
            "pcfg_req" => Self::ProcessingCfgRequired,
            other => Self::Other(other.to_string()),
        };
        Ok(state)
    }

    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "new",
            Self::Analyzing => "analyzing",
            Self::Ready => "ready",
            Self::Importing => "importing",
            Self::Done => "done",
            Self::Error => "error",
            Self::DataCfgRequired => "dcfg_req",
            Self::ProcessingCfgRequired => "pcfg_req",
            Self::Other(s) => s,
        }
    }

    /// Whether the scheduler is done with a task in this state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done | Self::Error | Self::DataCfgRequired | Self::ProcessingCfgRequired
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for TaskState {
    type Error = SchedulerError;

    fn try_from(value: String) -> Result<Self, SchedulerError> {
        Self::parse(&value)
    }
}

impl From<TaskState> for String {
    fn from(state: TaskState) -> Self {
        state.as_str().to_string()
    }
}

/// Flattened shared resource usage declaration: resource → requires exclusive access.
///
/// Only available once a task has been analyzed. An empty declaration is a
/// valid, present declaration (the task touches no shared resources).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharedResUsage(BTreeMap<ResourceId, bool>);

impl SharedResUsage {
    /// Create an empty declaration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`declare`](Self::declare).
    #[must_use]
    pub fn with(mut self, resource: impl Into<ResourceId>, exclusive: bool) -> Self {
        self.declare(resource, exclusive);
        self
    }

    /// Declare usage of a resource. Declaring the same resource twice keeps
    /// the most restrictive mode.
    pub fn declare(&mut self, resource: impl Into<ResourceId>, exclusive: bool) {
        let slot = self.0.entry(resource.into()).or_insert(false);
        *slot |= exclusive;
    }

    /// Access mode for a resource, if declared.
    #[must_use]
    pub fn is_exclusive(&self, resource: &str) -> Option<bool> {
        self.0.get(resource).copied()
    }

    /// Iterate `(resource, exclusive)` pairs in resource order.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, bool)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }

    /// Number of declared resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no resources are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<ResourceId>> FromIterator<(K, bool)> for SharedResUsage {
    fn from_iter<I: IntoIterator<Item = (K, bool)>>(iter: I) -> Self {
        let mut sru = Self::new();
        for (resource, exclusive) in iter {
            sru.declare(resource, exclusive);
        }
        sru
    }
}

/// Operation class a task is dispatched for. Also the routing-key suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// Analysis of a new task; tasks of this class never conflict.
    Analysis,
    /// Import of an analyzed task; subject to shared resource arbitration.
    Import,
}

impl OperationClass {
    /// Routing-key form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Import => "import",
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work. Identity is by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "WireTask", into = "WireTask")]
pub struct Task {
    id: TaskId,
    owner_id: OwnerId,
    state: TaskState,
    sru: Option<SharedResUsage>,
}

/// On-the-wire shape of a task.
#[derive(Serialize, Deserialize)]
struct WireTask {
    id: u64,
    #[serde(rename = "ownerID")]
    owner_id: u64,
    state: String,
    #[serde(default)]
    sru: Option<SharedResUsage>,
}

impl Task {
    /// Create a task.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `id` or `owner_id` is zero or the state is empty.
    pub fn new(
        id: TaskId,
        owner_id: OwnerId,
        state: TaskState,
        sru: Option<SharedResUsage>,
    ) -> Result<Self, SchedulerError> {
        if id == 0 {
            return Err(SchedulerError::InvalidArgument("none or invalid task id given".into()));
        }
        if owner_id == 0 {
            return Err(SchedulerError::InvalidArgument(
                "none or invalid task owner id given".into(),
            ));
        }
        if state.as_str().trim().is_empty() {
            return Err(SchedulerError::InvalidArgument("no task state given".into()));
        }
        Ok(Self { id, owner_id, state, sru })
    }

    /// Produce the next version of this task with a new state and declaration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the new state is empty.
    pub fn next_version(
        &self,
        state: TaskState,
        sru: Option<SharedResUsage>,
    ) -> Result<Self, SchedulerError> {
        Self::new(self.id, self.owner_id, state, sru)
    }

    /// Task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Owning tenant.
    #[must_use]
    pub const fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    /// External state.
    #[must_use]
    pub const fn state(&self) -> &TaskState {
        &self.state
    }

    /// Shared resource usage declaration, if the task has been analyzed.
    #[must_use]
    pub const fn shared_res_usage(&self) -> Option<&SharedResUsage> {
        self.sru.as_ref()
    }

    /// Decode a task from wire bytes.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the payload is not an object or lacks `id`,
    /// `ownerID` or `state`, and `InvalidArgument` if the values are out of range.
    pub fn from_json(bytes: &[u8]) -> Result<Self, SchedulerError> {
        let wire: WireTask = serde_json::from_slice(bytes)
            .map_err(|e| SchedulerError::Malformed(e.to_string()))?;
        Self::try_from(wire)
    }

    /// Encode the task to wire bytes.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, SchedulerError> {
        serde_json::to_vec(self).map_err(|e| SchedulerError::Malformed(e.to_string()))
    }
}

impl TryFrom<WireTask> for Task {
    type Error = SchedulerError;

    fn try_from(wire: WireTask) -> Result<Self, SchedulerError> {
        let state = TaskState::parse(&wire.state)?;
        Self::new(wire.id, wire.owner_id, state, wire.sru)
    }
}

impl From<Task> for WireTask {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            owner_id: task.owner_id,
            state: task.state.into(),
            sru: task.sru,
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task #{} [owner #{}] in state {}", self.id, self.owner_id, self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_rejects_invalid_arguments() {
        assert!(matches!(
            Task::new(0, 1, TaskState::New, None),
            Err(SchedulerError::InvalidArgument(_))
        ));
        assert!(matches!(
            Task::new(1, 0, TaskState::New, None),
            Err(SchedulerError::InvalidArgument(_))
        ));
        assert!(matches!(
            Task::new(1, 1, TaskState::Other(String::new()), None),
            Err(SchedulerError::InvalidArgument(_))
        ));
        assert!(matches!(TaskState::parse("   "), Err(SchedulerError::InvalidArgument(_))));
    }

    #[test]
    fn test_state_parse_known_and_unknown() {
        assert_eq!(TaskState::parse("new").unwrap(), TaskState::New);
        assert_eq!(TaskState::parse(" ready ").unwrap(), TaskState::Ready);
        assert_eq!(TaskState::parse("pcfg_req").unwrap(), TaskState::ProcessingCfgRequired);
        assert_eq!(
            TaskState::parse("archived").unwrap(),
            TaskState::Other("archived".into())
        );
        assert!(TaskState::DataCfgRequired.is_terminal());
        assert!(!TaskState::Importing.is_terminal());
    }

    #[test]
    fn test_state_from_wire_string() {
        assert_eq!(TaskState::try_from("error".to_string()).unwrap(), TaskState::Error);
        assert_eq!(TaskState::try_from("dcfg_req".to_string()).unwrap(), TaskState::DataCfgRequired);
        assert!(matches!(
            TaskState::try_from(String::new()),
            Err(SchedulerError::InvalidArgument(_))
        ));
        assert_eq!(String::from(TaskState::Error), "error");

        let task = Task::from_json(br#"{"id": 4, "ownerID": 2, "state": "error"}"#).unwrap();
        assert_eq!(task.state(), &TaskState::Error);
    }

    #[test]
    fn test_wire_format_field_names() {
        let task = Task::new(7, 3, TaskState::Ready, Some(SharedResUsage::new().with("12", true)))
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&task.to_json().unwrap()).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["ownerID"], 3);
        assert_eq!(value["state"], "ready");
        assert_eq!(value["sru"]["12"], true);

        let bare = Task::new(8, 3, TaskState::New, None).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bare.to_json().unwrap()).unwrap();
        assert!(value["sru"].is_null());
    }

    #[test]
    fn test_round_trip_keeps_declaration_presence() {
        let absent = Task::new(1, 2, TaskState::New, None).unwrap();
        let decoded = Task::from_json(&absent.to_json().unwrap()).unwrap();
        assert!(decoded.shared_res_usage().is_none());

        let empty = Task::new(1, 2, TaskState::Ready, Some(SharedResUsage::new())).unwrap();
        let decoded = Task::from_json(&empty.to_json().unwrap()).unwrap();
        assert_eq!(decoded.shared_res_usage(), Some(&SharedResUsage::new()));

        let sru: SharedResUsage = [("a", true), ("b", false)].into_iter().collect();
        let full = Task::new(5, 9, TaskState::Ready, Some(sru.clone())).unwrap();
        let decoded = Task::from_json(&full.to_json().unwrap()).unwrap();
        assert_eq!(decoded.id(), 5);
        assert_eq!(decoded.owner_id(), 9);
        assert_eq!(decoded.state(), &TaskState::Ready);
        assert_eq!(decoded.shared_res_usage(), Some(&sru));
    }

    #[test]
    fn test_decode_malformed_payloads() {
        assert!(matches!(Task::from_json(b"[1,2,3]"), Err(SchedulerError::Malformed(_))));
        assert!(matches!(Task::from_json(b"not json"), Err(SchedulerError::Malformed(_))));
        assert!(matches!(
            Task::from_json(br#"{"ownerID": 1, "state": "new"}"#),
            Err(SchedulerError::Malformed(_))
        ));
        assert!(matches!(
            Task::from_json(br#"{"id": 1, "state": "new"}"#),
            Err(SchedulerError::Malformed(_))
        ));
        assert!(matches!(
            Task::from_json(br#"{"id": 1, "ownerID": 1}"#),
            Err(SchedulerError::Malformed(_))
        ));
        assert!(matches!(
            Task::from_json(br#"{"id": 0, "ownerID": 1, "state": "new"}"#),
            Err(SchedulerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_decode_without_sru_key() {
        let task = Task::from_json(br#"{"id": 4, "ownerID": 2, "state": "new"}"#).unwrap();
        assert_eq!(task.id(), 4);
        assert!(task.shared_res_usage().is_none());
    }

    #[test]
    fn test_declare_keeps_most_restrictive() {
        let sru = SharedResUsage::new().with("x", true).with("x", false).with("y", false);
        assert_eq!(sru.is_exclusive("x"), Some(true));
        assert_eq!(sru.is_exclusive("y"), Some(false));
        assert_eq!(sru.is_exclusive("z"), None);
        assert_eq!(sru.len(), 2);
    }

    #[test]
    fn test_identity_is_by_id() {
        let a = Task::new(1, 1, TaskState::New, None).unwrap();
        let b = a.next_version(TaskState::Ready, Some(SharedResUsage::new())).unwrap();
        assert_eq!(a, b);
    }
}

//! Per-owner task queue.
//!
//! Keeps entries in arrival order for their whole lifetime, tracks how many
//! of them are published to workers, and picks the next task for each
//! operation class through its cursors. Entries in the `New`/`ShdAnalysis`
//! group and entries in the `Ready`/`ShdImport` group are picked
//! independently so both classes can be dispatched under separate limits.
//!
//! Removed ids stay in the order index until the next cursor is created,
//! so dequeuing does not shift the index on every completion.

use std::collections::{HashMap, HashSet};

use crate::core::cursor::{AnalysisCursor, ImportCursor};
use crate::core::entry::{Entry, SchedulingState, TransitionGraph, MARK_SCHEDULED, REVERT_SCHEDULED};
use crate::core::task::{OperationClass, OwnerId, Task, TaskId};
use crate::core::SchedulerError;

/// Default analysis cursor traversal depth.
pub const DEFAULT_TRAVERSAL_DEPTH_ANALYSIS: usize = 50;
/// Default import cursor traversal depth.
pub const DEFAULT_TRAVERSAL_DEPTH_IMPORT: usize = 20;

/// Ordered queue of one owner's tasks.
#[derive(Debug)]
pub struct Queue {
    owner_id: OwnerId,
    order: Vec<TaskId>,
    entries: HashMap<TaskId, Entry>,
    removed: HashSet<TaskId>,
    depth_analysis: usize,
    depth_import: usize,
    cursor_analysis: Option<AnalysisCursor>,
    cursor_import: Option<ImportCursor>,
    scheduled_analysis: usize,
    scheduled_import: usize,
}

impl Queue {
    /// Queue with default traversal depths.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `owner_id` is zero.
    pub fn new(owner_id: OwnerId) -> Result<Self, SchedulerError> {
        Self::with_depths(owner_id, DEFAULT_TRAVERSAL_DEPTH_ANALYSIS, DEFAULT_TRAVERSAL_DEPTH_IMPORT)
    }

    /// Queue with explicit cursor traversal depths.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `owner_id` or either depth is zero.
    pub fn with_depths(
        owner_id: OwnerId,
        depth_analysis: usize,
        depth_import: usize,
    ) -> Result<Self, SchedulerError> {
        if owner_id == 0 {
            return Err(SchedulerError::InvalidArgument("none or invalid owner id given".into()));
        }
        if depth_analysis == 0 || depth_import == 0 {
            return Err(SchedulerError::InvalidArgument(
                "cursor traversal max depth must be a positive integer".into(),
            ));
        }
        Ok(Self {
            owner_id,
            order: Vec::new(),
            entries: HashMap::new(),
            removed: HashSet::new(),
            depth_analysis,
            depth_import,
            cursor_analysis: None,
            cursor_import: None,
            scheduled_analysis: 0,
            scheduled_import: 0,
        })
    }

    /// Owner this queue belongs to.
    #[must_use]
    pub const fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    /// Append a task at the tail.
    ///
    /// # Errors
    ///
    /// `Mismatch` for a foreign owner, `Duplicate` for an id already present,
    /// `IllegalTaskState` for a transitional state and `IllegalState` for a
    /// task that is already complete.
    pub fn append(&mut self, task: Task) -> Result<(), SchedulerError> {
        if task.owner_id() != self.owner_id {
            return Err(SchedulerError::Mismatch(format!(
                "attempted to enqueue a task with different owner ({} <- {})",
                self.owner_id,
                task.owner_id()
            )));
        }
        if self.has(task.id()) {
            return Err(SchedulerError::Duplicate { task_id: task.id() });
        }
        let entry = Entry::new(task)?;
        if entry.is_completed() {
            return Err(SchedulerError::IllegalState(format!(
                "attempted to enqueue completed task #{}",
                entry.id()
            )));
        }
        if self.removed.contains(&entry.id()) {
            self.compact();
        }
        self.order.push(entry.id());
        self.entries.insert(entry.id(), entry);
        Ok(())
    }

    /// Replace a task with its updated version. Completed tasks are removed.
    ///
    /// # Errors
    ///
    /// `NotFound` if the task is not enqueued, plus any sync error. The queue
    /// is unchanged on error.
    pub fn update(&mut self, task: Task) -> Result<(), SchedulerError> {
        let id = task.id();
        let entry = self.entries.get_mut(&id).ok_or(SchedulerError::NotFound { task_id: id })?;
        let prev = entry.state();
        entry.sync_to_updated_task(task)?;
        let next = entry.state();

        self.on_state_leave(prev)?;
        if next == SchedulingState::Completed {
            self.detach(id);
        } else {
            self.on_state_enter(next);
        }
        Ok(())
    }

    /// Remove a task. Absent ids are ignored.
    ///
    /// # Errors
    ///
    /// `CounterUnderflow` if the scheduled counters are inconsistent.
    pub fn remove(&mut self, id: TaskId) -> Result<(), SchedulerError> {
        if let Some(entry) = self.entries.get(&id) {
            self.on_state_leave(entry.state())?;
            self.detach(id);
        }
        Ok(())
    }

    /// Mark a task as published to workers.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `IllegalState` if the entry is not `New`/`Ready`.
    pub fn mark_scheduled(&mut self, id: TaskId) -> Result<(), SchedulerError> {
        self.change_state(id, MARK_SCHEDULED, "mark_scheduled")
    }

    /// Undo [`mark_scheduled`](Self::mark_scheduled) for a task that could not
    /// be delivered.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `IllegalState` if the entry is not scheduled.
    pub fn revert_scheduled(&mut self, id: TaskId) -> Result<(), SchedulerError> {
        self.change_state(id, REVERT_SCHEDULED, "revert_scheduled")
    }

    fn change_state(
        &mut self,
        id: TaskId,
        graph: &TransitionGraph,
        op: &str,
    ) -> Result<(), SchedulerError> {
        let entry = self.entries.get_mut(&id).ok_or(SchedulerError::NotFound { task_id: id })?;
        let prev = entry.state();
        if !entry.transition(graph) {
            return Err(SchedulerError::IllegalState(format!(
                "{op}() called for task #{id} in {prev} state"
            )));
        }
        let next = entry.state();
        self.on_state_leave(prev)?;
        self.on_state_enter(next);
        Ok(())
    }

    /// Whether a task is enqueued.
    #[must_use]
    pub fn has(&self, id: TaskId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Scheduling state of an enqueued task.
    #[must_use]
    pub fn state_of(&self, id: TaskId) -> Option<SchedulingState> {
        self.entries.get(&id).map(Entry::state)
    }

    /// Number of enqueued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tasks in queue order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.entries.get(id)).map(Entry::task)
    }

    /// Next task eligible for analysis in this cycle.
    ///
    /// # Errors
    ///
    /// Propagates cursor invariant violations.
    pub fn next_for_analysis(&mut self) -> Result<Option<Task>, SchedulerError> {
        if self.cursor_analysis.is_none() {
            self.compact();
        }
        let depth = self.depth_analysis;
        let cursor = self.cursor_analysis.get_or_insert_with(|| AnalysisCursor::new(depth));
        let found = cursor.find_next(&self.order, &self.entries)?;
        Ok(found.and_then(|id| self.entries.get(&id)).map(|e| e.task().clone()))
    }

    /// Next task eligible for import in this cycle, conflict-free with every
    /// task published or skipped ahead of it.
    ///
    /// # Errors
    ///
    /// Propagates cursor invariant violations such as a missing declaration.
    pub fn next_for_import(&mut self) -> Result<Option<Task>, SchedulerError> {
        if self.cursor_import.is_none() {
            self.compact();
        }
        let depth = self.depth_import;
        let cursor = self.cursor_import.get_or_insert_with(|| ImportCursor::new(depth));
        let found = cursor.find_next(&self.order, &self.entries)?;
        Ok(found.and_then(|id| self.entries.get(&id)).map(|e| e.task().clone()))
    }

    /// Next task eligible for `class`.
    ///
    /// # Errors
    ///
    /// See [`next_for_analysis`](Self::next_for_analysis) and
    /// [`next_for_import`](Self::next_for_import).
    pub fn next_for(&mut self, class: OperationClass) -> Result<Option<Task>, SchedulerError> {
        match class {
            OperationClass::Analysis => self.next_for_analysis(),
            OperationClass::Import => self.next_for_import(),
        }
    }

    /// Discard both cursors. Must run at the start of every dispatch cycle.
    pub fn reset_cursor(&mut self) {
        self.cursor_analysis = None;
        self.cursor_import = None;
        self.compact();
    }

    /// Tasks published for analysis and not yet processed.
    #[must_use]
    pub const fn scheduled_analysis(&self) -> usize {
        self.scheduled_analysis
    }

    /// Tasks published for import and not yet processed.
    #[must_use]
    pub const fn scheduled_import(&self) -> usize {
        self.scheduled_import
    }

    /// Scheduled count for `class`.
    #[must_use]
    pub const fn scheduled_count(&self, class: OperationClass) -> usize {
        match class {
            OperationClass::Analysis => self.scheduled_analysis,
            OperationClass::Import => self.scheduled_import,
        }
    }

    fn detach(&mut self, id: TaskId) {
        self.entries.remove(&id);
        self.removed.insert(id);
        // Cursors must not walk over a removed id.
        self.cursor_analysis = None;
        self.cursor_import = None;
    }

    fn compact(&mut self) {
        if self.removed.is_empty() {
            return;
        }
        let entries = &self.entries;
        self.order.retain(|id| entries.contains_key(id));
        self.removed.clear();
    }

    fn on_state_enter(&mut self, state: SchedulingState) {
        match state {
            SchedulingState::ShdAnalysis => self.scheduled_analysis += 1,
            SchedulingState::ShdImport => self.scheduled_import += 1,
            _ => {}
        }
    }

    fn on_state_leave(&mut self, state: SchedulingState) -> Result<(), SchedulerError> {
        match state {
            SchedulingState::ShdAnalysis => {
                self.scheduled_analysis = self
                    .scheduled_analysis
                    .checked_sub(1)
                    .ok_or(SchedulerError::CounterUnderflow("scheduled analysis"))?;
            }
            SchedulingState::ShdImport => {
                self.scheduled_import = self
                    .scheduled_import
                    .checked_sub(1)
                    .ok_or(SchedulerError::CounterUnderflow("scheduled import"))?;
            }
            _ => {}
        }
        Ok(())
    }
}

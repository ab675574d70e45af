//! Queue traversal cursors.
//!
//! A cursor walks a queue from head to tail within one dispatch cycle and
//! picks the next entry suitable for one operation class. The scan loop and
//! depth limit live in [`Cursor`]; the per-class decision lives in a
//! [`TraversalPolicy`].
//!
//! A cursor resumes from the entry the previous call stopped on, so entries
//! it returned earlier (and which are now scheduled) are accounted for in the
//! next call. The traversal counter spans the cursor's whole lifetime.

use std::collections::HashMap;

use crate::core::entry::{Entry, SchedulingState};
use crate::core::task::{ResourceId, TaskId};
use crate::core::SchedulerError;

/// Outcome of evaluating one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Entry is eligible; the cursor stays on it.
    Found,
    /// Entry is not eligible; move on.
    Continue,
    /// Nothing past this entry may be picked.
    Stop,
}

/// Per-class entry evaluation.
pub trait TraversalPolicy: Default {
    /// Evaluate one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry violates a queue invariant.
    fn evaluate(&mut self, entry: &Entry) -> Result<Verdict, SchedulerError>;
}

/// Analysis tasks never conflict: any `New` entry will do.
#[derive(Debug, Default)]
pub struct AnalysisPolicy;

impl TraversalPolicy for AnalysisPolicy {
    fn evaluate(&mut self, entry: &Entry) -> Result<Verdict, SchedulerError> {
        Ok(if entry.state() == SchedulingState::New {
            Verdict::Found
        } else {
            Verdict::Continue
        })
    }
}

/// Import arbitration with a cumulative shared resource tracker.
#[derive(Debug, Default)]
pub struct ImportPolicy {
    /// resource → seen as exclusive by any traversed entry
    tracker: HashMap<ResourceId, bool>,
}

impl ImportPolicy {
    fn collect(&mut self, entry: &Entry) -> Result<(), SchedulerError> {
        let sru = entry
            .shared_res_usage()?
            .ok_or(SchedulerError::SharedResourceInfoMissing { task_id: entry.id() })?;
        for (resource, exclusive) in sru.iter() {
            let slot = self.tracker.entry(resource.clone()).or_insert(false);
            *slot |= exclusive;
        }
        Ok(())
    }

    fn conflicts(&self, entry: &Entry) -> Result<bool, SchedulerError> {
        let sru = entry
            .shared_res_usage()?
            .ok_or(SchedulerError::SharedResourceInfoMissing { task_id: entry.id() })?;
        Ok(sru.iter().any(|(resource, exclusive)| {
            self.tracker
                .get(resource)
                .is_some_and(|&tracked| tracked || exclusive)
        }))
    }
}

impl TraversalPolicy for ImportPolicy {
    fn evaluate(&mut self, entry: &Entry) -> Result<Verdict, SchedulerError> {
        match entry.state() {
            // No declaration yet: anything behind it could conflict with it.
            SchedulingState::New | SchedulingState::ShdAnalysis => Ok(Verdict::Stop),
            SchedulingState::ShdImport => {
                self.collect(entry)?;
                Ok(Verdict::Continue)
            }
            SchedulingState::Ready => {
                if self.conflicts(entry)? {
                    // Skipped entries still reserve their resources, so later
                    // entries cannot jump ahead of them.
                    self.collect(entry)?;
                    Ok(Verdict::Continue)
                } else {
                    Ok(Verdict::Found)
                }
            }
            SchedulingState::Completed => Ok(Verdict::Continue),
        }
    }
}

/// Scan driver shared by both policies.
#[derive(Debug)]
pub struct Cursor<P: TraversalPolicy> {
    policy: P,
    position: usize,
    traversed: usize,
    max_depth: usize,
}

/// Cursor picking entries for analysis.
pub type AnalysisCursor = Cursor<AnalysisPolicy>;

/// Cursor picking entries for import.
pub type ImportCursor = Cursor<ImportPolicy>;

impl<P: TraversalPolicy> Cursor<P> {
    /// Fresh cursor at the queue head.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            policy: P::default(),
            position: 0,
            traversed: 0,
            max_depth,
        }
    }

    /// Find the next eligible entry in `order`, resuming where the previous
    /// call stopped. Returns `None` at the end of the queue, on a stop verdict
    /// or once the traversal depth is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if `order` references an id missing from
    /// `entries`, or any error raised by the policy.
    pub fn find_next(
        &mut self,
        order: &[TaskId],
        entries: &HashMap<TaskId, Entry>,
    ) -> Result<Option<TaskId>, SchedulerError> {
        while let Some(&id) = order.get(self.position) {
            if self.traversed >= self.max_depth {
                return Ok(None);
            }
            let entry = entries.get(&id).ok_or_else(|| {
                SchedulerError::IllegalState(format!("queue order references unknown task #{id}"))
            })?;
            match self.policy.evaluate(entry)? {
                Verdict::Found => return Ok(Some(id)),
                Verdict::Stop => return Ok(None),
                Verdict::Continue => {
                    self.traversed += 1;
                    self.position += 1;
                }
            }
        }
        Ok(None)
    }

    /// Entries skipped so far.
    #[must_use]
    pub const fn traversed(&self) -> usize {
        self.traversed
    }
}

//! Apply mutation plans to a store with compensating rollback.
//!
//! The engine itself never writes anything; callers own persistence. This
//! module is the reference implementation of the plan protocol for callers
//! that can expose their storage as a [`ShiftStore`]:
//!
//! 1. Forward intents run in order.
//! 2. An intent addressing a missing record is a no-op, recorded as an
//!    [`Inconsistency`] in the report rather than aborting the plan.
//! 3. Any other failure at step *k* runs the compensations of the steps
//!    already applied, newest first, and returns [`SagaError::Aborted`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::model::{Schedule, Shift, ShiftId};
use crate::series::{Intent, MutationPlan};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Shift not found: {0}")]
    NotFound(ShiftId),

    #[error("Shift already exists: {0}")]
    AlreadyExists(ShiftId),

    #[error("Shift is not recurring: {0}")]
    NotRecurring(ShiftId),

    #[error("Store error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum SagaError {
    #[error("Step {step} failed: {source}; rolled back {rolled_back} step(s)")]
    Aborted {
        step: usize,
        source: StoreError,
        rolled_back: usize,
    },

    #[error("Step {step} failed: {cause}; rollback failed at step {rollback_step}: {source}")]
    RollbackFailed {
        step: usize,
        cause: StoreError,
        rollback_step: usize,
        source: StoreError,
    },
}

/// Persistence operations a plan needs.
pub trait ShiftStore {
    fn get(&self, id: &ShiftId) -> Option<Shift>;
    fn insert(&mut self, shift: Shift) -> Result<(), StoreError>;
    fn replace(&mut self, shift: Shift) -> Result<(), StoreError>;
    fn update_recurrence(
        &mut self,
        id: &ShiftId,
        exceptions: BTreeSet<NaiveDate>,
        end_repeat: Option<NaiveDate>,
    ) -> Result<(), StoreError>;
    fn delete(&mut self, id: &ShiftId) -> Result<(), StoreError>;
}

/// An intent that addressed a record no longer in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inconsistency {
    pub step: usize,
    pub intent: &'static str,
    pub id: ShiftId,
}

/// Outcome of a successful [`execute`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SagaReport {
    /// Steps whose forward intent took effect.
    pub applied: usize,
    pub inconsistencies: Vec<Inconsistency>,
}

/// Apply one intent.
pub fn apply<S: ShiftStore + ?Sized>(store: &mut S, intent: &Intent) -> Result<(), StoreError> {
    match intent {
        Intent::Create { shift } => store.insert(shift.clone()),
        Intent::Replace { shift } => store.replace(shift.clone()),
        Intent::UpdateRecurrence {
            id,
            exceptions,
            end_repeat,
        } => store.update_recurrence(id, exceptions.clone(), *end_repeat),
        Intent::Delete { id } => store.delete(id),
    }
}

/// Run `plan` against `store`, rolling back on failure.
#[tracing::instrument(skip_all, fields(steps = plan.len()))]
pub fn execute<S: ShiftStore + ?Sized>(
    plan: &MutationPlan,
    store: &mut S,
) -> Result<SagaReport, SagaError> {
    let mut report = SagaReport::default();
    // Indices of steps that actually changed the store.
    let mut done: Vec<usize> = Vec::with_capacity(plan.len());

    for (step, saga_step) in plan.steps.iter().enumerate() {
        match apply(store, &saga_step.forward) {
            Ok(()) => {
                done.push(step);
                report.applied += 1;
            }
            Err(StoreError::NotFound(id)) => {
                tracing::warn!(step, %id, intent = saga_step.forward.kind(), "stale shift id; skipping");
                report.inconsistencies.push(Inconsistency {
                    step,
                    intent: saga_step.forward.kind(),
                    id,
                });
            }
            Err(cause) => {
                tracing::warn!(step, error = %cause, "saga step failed; rolling back");
                return Err(compensate(plan, store, &done, step, cause));
            }
        }
    }
    tracing::debug!(applied = report.applied, "saga complete");
    Ok(report)
}

fn compensate<S: ShiftStore + ?Sized>(
    plan: &MutationPlan,
    store: &mut S,
    done: &[usize],
    failed_step: usize,
    cause: StoreError,
) -> SagaError {
    for &step in done.iter().rev() {
        match apply(store, &plan.steps[step].compensation) {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(source) => {
                tracing::error!(step, error = %source, "compensation failed");
                return SagaError::RollbackFailed {
                    step: failed_step,
                    cause,
                    rollback_step: step,
                    source,
                };
            }
        }
    }
    SagaError::Aborted {
        step: failed_step,
        source: cause,
        rolled_back: done.len(),
    }
}

/// A [`ShiftStore`] over a `Vec`, preserving insertion (storage) order.
///
/// A deleted shift that is inserted again (as a rollback does) returns to
/// the slot it was removed from.
#[derive(Debug, Clone, Default)]
pub struct InMemoryShiftStore {
    shifts: Vec<Shift>,
    removed: BTreeMap<ShiftId, usize>,
}

impl InMemoryShiftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shifts(shifts: impl IntoIterator<Item = Shift>) -> Self {
        Self {
            shifts: shifts.into_iter().collect(),
            removed: BTreeMap::new(),
        }
    }

    /// All shifts in storage order.
    pub fn shifts(&self) -> &[Shift] {
        &self.shifts
    }

    /// Shifts split off `parent`, in storage order.
    pub fn children_of(&self, parent: &ShiftId) -> Vec<Shift> {
        self.shifts
            .iter()
            .filter(|s| s.parent_id.as_ref() == Some(parent))
            .cloned()
            .collect()
    }

    fn position(&self, id: &ShiftId) -> Result<usize, StoreError> {
        self.shifts
            .iter()
            .position(|s| &s.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

impl ShiftStore for InMemoryShiftStore {
    fn get(&self, id: &ShiftId) -> Option<Shift> {
        self.shifts.iter().find(|s| &s.id == id).cloned()
    }

    fn insert(&mut self, shift: Shift) -> Result<(), StoreError> {
        if self.shifts.iter().any(|s| s.id == shift.id) {
            return Err(StoreError::AlreadyExists(shift.id));
        }
        match self.removed.remove(&shift.id) {
            Some(index) => self.shifts.insert(index.min(self.shifts.len()), shift),
            None => self.shifts.push(shift),
        }
        Ok(())
    }

    fn replace(&mut self, shift: Shift) -> Result<(), StoreError> {
        let index = self.position(&shift.id)?;
        self.shifts[index] = shift;
        Ok(())
    }

    fn update_recurrence(
        &mut self,
        id: &ShiftId,
        exceptions: BTreeSet<NaiveDate>,
        end_repeat: Option<NaiveDate>,
    ) -> Result<(), StoreError> {
        let index = self.position(id)?;
        match &mut self.shifts[index].schedule {
            Schedule::Recurring(series) => {
                series.exceptions = exceptions;
                series.end_repeat = end_repeat;
                Ok(())
            }
            Schedule::Single(_) => Err(StoreError::NotRecurring(id.clone())),
        }
    }

    fn delete(&mut self, id: &ShiftId) -> Result<(), StoreError> {
        let index = self.position(id)?;
        self.shifts.remove(index);
        self.removed.insert(id.clone(), index);
        Ok(())
    }
}

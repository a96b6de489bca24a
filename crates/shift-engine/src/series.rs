//! Safe mutation of recurring series.
//!
//! Nothing here touches storage. Each operation returns a [`MutationPlan`]:
//! an ordered list of [`SagaStep`]s, each pairing a forward [`Intent`] with
//! the intent that undoes it. The caller applies the forward intents in
//! order; if step *k* fails it applies the compensations of steps *k-1..0*
//! in reverse. [`crate::saga::execute`] implements that protocol over a
//! [`crate::saga::ShiftStore`].
//!
//! # Operations
//!
//! - [`SeriesMutator::delete_occurrence`] — suppress one date (or drop the record)
//! - [`SeriesMutator::delete_following`] — end the series before a date
//! - [`SeriesMutator::edit_occurrence`] — split one date off into a child shift
//! - [`SeriesMutator::edit_following`] — start a successor series at a date

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShiftError};
use crate::model::{IdGenerator, Patch, Schedule, Series, Shift, ShiftId, ShiftPatch};
use crate::occurrence::{has_other_occurrence, previous_occurrence_date, SeriesDates};
use crate::rule::Frequency;
use crate::validate::validate_schedule;

/// A single storage operation, expressed as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Intent {
    /// Insert a new record.
    Create { shift: Shift },
    /// Overwrite the exception set and end-of-repeat of a recurring record.
    UpdateRecurrence {
        id: ShiftId,
        exceptions: BTreeSet<NaiveDate>,
        end_repeat: Option<NaiveDate>,
    },
    /// Overwrite a whole record.
    Replace { shift: Shift },
    /// Remove a record.
    Delete { id: ShiftId },
}

impl Intent {
    pub fn target(&self) -> &ShiftId {
        match self {
            Intent::Create { shift } | Intent::Replace { shift } => &shift.id,
            Intent::UpdateRecurrence { id, .. } | Intent::Delete { id } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Intent::Create { .. } => "create",
            Intent::UpdateRecurrence { .. } => "update_recurrence",
            Intent::Replace { .. } => "replace",
            Intent::Delete { .. } => "delete",
        }
    }
}

/// A forward intent and the intent that reverts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaStep {
    pub forward: Intent,
    pub compensation: Intent,
}

impl SagaStep {
    fn create(shift: Shift) -> Self {
        let id = shift.id.clone();
        Self {
            forward: Intent::Create { shift },
            compensation: Intent::Delete { id },
        }
    }

    fn delete(shift: &Shift) -> Self {
        Self {
            forward: Intent::Delete {
                id: shift.id.clone(),
            },
            compensation: Intent::Create {
                shift: shift.clone(),
            },
        }
    }

    fn replace(before: &Shift, after: Shift) -> Self {
        Self {
            forward: Intent::Replace { shift: after },
            compensation: Intent::Replace {
                shift: before.clone(),
            },
        }
    }

    fn update_recurrence(id: &ShiftId, before: &Series, after: &Series) -> Self {
        Self {
            forward: Intent::UpdateRecurrence {
                id: id.clone(),
                exceptions: after.exceptions.clone(),
                end_repeat: after.end_repeat,
            },
            compensation: Intent::UpdateRecurrence {
                id: id.clone(),
                exceptions: before.exceptions.clone(),
                end_repeat: before.end_repeat,
            },
        }
    }
}

/// Ordered saga steps. An empty plan means "nothing to do".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationPlan {
    pub steps: Vec<SagaStep>,
}

impl MutationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn push(&mut self, step: SagaStep) {
        self.steps.push(step);
    }

    pub fn extend(&mut self, other: MutationPlan) {
        self.steps.extend(other.steps);
    }

    /// Forward intents in application order.
    pub fn forward(&self) -> impl Iterator<Item = &Intent> {
        self.steps.iter().map(|step| &step.forward)
    }

    /// Compensations undoing the first `applied` steps, in the order to run them.
    pub fn rollback(&self, applied: usize) -> Vec<&Intent> {
        self.steps[..applied.min(self.steps.len())]
            .iter()
            .rev()
            .map(|step| &step.compensation)
            .collect()
    }

    /// The shift created by this plan, if any.
    pub fn created(&self) -> Option<&Shift> {
        self.forward().find_map(|intent| match intent {
            Intent::Create { shift } => Some(shift),
            _ => None,
        })
    }
}

/// Plans mutations on recurring series.
///
/// Borrows its id generator for its own lifetime; construct one per request
/// or keep it next to the generator it uses.
pub struct SeriesMutator<'a> {
    ids: &'a dyn IdGenerator,
}

impl<'a> SeriesMutator<'a> {
    pub fn new(ids: &'a dyn IdGenerator) -> Self {
        Self { ids }
    }

    /// Remove the occurrence dated `date`.
    ///
    /// A single shift is deleted outright. In a series, the date joins the
    /// exception set; when it was the end-of-repeat date, end-of-repeat moves
    /// back to the previous real occurrence. When no other occurrence would
    /// remain, the whole record is deleted instead.
    #[tracing::instrument(skip(self, shift), fields(shift_id = %shift.id))]
    pub fn delete_occurrence(&self, shift: &Shift, date: NaiveDate) -> Result<MutationPlan> {
        let mut plan = MutationPlan::new();
        let series = match &shift.schedule {
            Schedule::Single(range) => {
                if range.date() != date {
                    return Err(ShiftError::NoOccurrence(date));
                }
                plan.push(SagaStep::delete(shift));
                return Ok(plan);
            }
            Schedule::Recurring(series) => series,
        };

        if !series.is_occurrence_date(date) {
            return Err(ShiftError::NoOccurrence(date));
        }

        if !has_other_occurrence(series, date) {
            tracing::debug!(%date, "last remaining occurrence; deleting series");
            plan.push(SagaStep::delete(shift));
            return Ok(plan);
        }

        let mut updated = series.clone();
        updated.exceptions.insert(date);
        if series.end_repeat == Some(date) {
            updated.end_repeat = previous_occurrence_date(&updated, date);
        }
        tracing::debug!(%date, end_repeat = ?updated.end_repeat, "excepting occurrence");
        plan.push(SagaStep::update_recurrence(&shift.id, series, &updated));
        Ok(plan)
    }

    /// Remove every occurrence on or after `from`.
    ///
    /// `children` are the shifts previously split off this series; those
    /// starting on or after the cut are deleted with it. Records whose
    /// `parent_id` is not this shift are ignored.
    #[tracing::instrument(skip(self, shift, children), fields(shift_id = %shift.id))]
    pub fn delete_following(
        &self,
        shift: &Shift,
        from: NaiveDate,
        children: &[Shift],
    ) -> Result<MutationPlan> {
        let Schedule::Recurring(series) = &shift.schedule else {
            return Err(ShiftError::Invariant(format!(
                "delete-following on non-repeating shift {}",
                shift.id
            )));
        };

        let mut plan = MutationPlan::new();
        let anchor_date = series.anchor_date();

        if from < anchor_date {
            tracing::debug!(%from, "cut precedes series; deleting series");
            plan.push(SagaStep::delete(shift));
            plan.extend(cascade(shift, children, anchor_date));
            return Ok(plan);
        }

        match previous_occurrence_date(series, from) {
            None => {
                tracing::debug!(%from, "no occurrence before cut; deleting series");
                plan.push(SagaStep::delete(shift));
            }
            Some(last) => {
                let mut updated = series.clone();
                updated.end_repeat = Some(last);
                updated.exceptions.retain(|d| *d <= last);
                if updated != *series {
                    tracing::debug!(%from, end_repeat = %last, "truncating series");
                    plan.push(SagaStep::update_recurrence(&shift.id, series, &updated));
                }
            }
        }
        plan.extend(cascade(shift, children, from));
        Ok(plan)
    }

    /// Edit the occurrence dated `date` on its own.
    ///
    /// A single shift is replaced in place. For a series, a non-repeating
    /// child carrying the edit is created and the date is removed from the
    /// series; the series update comes first so a failed child insert rolls
    /// it back. Repeat rule and end-of-repeat cannot change here.
    #[tracing::instrument(skip(self, shift, patch), fields(shift_id = %shift.id))]
    pub fn edit_occurrence(
        &self,
        shift: &Shift,
        date: NaiveDate,
        patch: &ShiftPatch,
    ) -> Result<MutationPlan> {
        if !patch.repeat.is_keep() || !patch.end_repeat.is_keep() {
            return Err(ShiftError::Invariant(
                "repeat rule changes must go through edit-following".to_string(),
            ));
        }

        let series = match &shift.schedule {
            Schedule::Single(range) => {
                if range.date() != date {
                    return Err(ShiftError::NoOccurrence(date));
                }
                let mut updated = shift.clone();
                updated.schedule = Schedule::Single(patch.range_for(range));
                patch.apply_details(shift, &mut updated);
                if updated == *shift {
                    return Ok(MutationPlan::new());
                }
                validate_schedule(&updated.schedule)?;
                let mut plan = MutationPlan::new();
                plan.push(SagaStep::replace(shift, updated));
                return Ok(plan);
            }
            Schedule::Recurring(series) => series,
        };

        if !series.is_occurrence_date(date) {
            return Err(ShiftError::NoOccurrence(date));
        }

        let occurrence = series.occurrence_on(date);
        let mut child = Shift::new(
            self.ids.next_id(),
            Schedule::Single(patch.range_for(&occurrence)),
        );
        patch.apply_details(shift, &mut child);
        child.parent_id = Some(shift.id.clone());
        child.duty = shift
            .duty
            .filter(|duty| occurrence.start < duty.at && duty.at <= occurrence.end);

        if child.schedule == Schedule::Single(occurrence) && same_details(shift, &child) {
            return Ok(MutationPlan::new());
        }
        validate_schedule(&child.schedule)?;

        let mut plan = self.delete_occurrence(shift, date)?;
        // Removing the last occurrence deletes the series record itself.
        if plan
            .forward()
            .any(|intent| matches!(intent, Intent::Delete { id } if *id == shift.id))
        {
            child.parent_id = None;
        }
        tracing::debug!(%date, child_id = %child.id, "splitting occurrence into child");
        plan.push(SagaStep::create(child));
        Ok(plan)
    }

    /// Edit every occurrence from `from` on.
    ///
    /// A successor shift anchored at the first occurrence on or after `from`
    /// is created with the edit applied, then the original is cut with
    /// [`delete_following`](Self::delete_following). Exceptions and
    /// end-of-repeat carry over to the successor, moved by the same number of
    /// days as the edited start if the edit changed its date.
    #[tracing::instrument(skip(self, shift, patch, children), fields(shift_id = %shift.id))]
    pub fn edit_following(
        &self,
        shift: &Shift,
        from: NaiveDate,
        patch: &ShiftPatch,
        children: &[Shift],
    ) -> Result<MutationPlan> {
        let Schedule::Recurring(series) = &shift.schedule else {
            return Err(ShiftError::Invariant(format!(
                "edit-following on non-repeating shift {}",
                shift.id
            )));
        };

        let first = SeriesDates::new(series, from)
            .next()
            .ok_or(ShiftError::NoOccurrence(from))?;
        let occurrence = series.occurrence_on(first);
        let anchor = patch.range_for(&occurrence);
        let day_shift = (anchor.date() - first).num_days();

        let rule = patch.repeat.apply(Some(&series.rule));
        let end_repeat = match &patch.end_repeat {
            Patch::Keep => series.end_repeat.map(|d| shift_date(d, day_shift)),
            edited => edited.apply(series.end_repeat.as_ref()),
        };

        let schedule = match rule {
            None => Schedule::Single(anchor),
            Some(rule) => {
                let rule = if patch.repeat.is_keep() && rule.frequency == Frequency::Weekly {
                    rule.rotated(day_shift)
                } else {
                    rule
                };
                Schedule::Recurring(Series {
                    anchor,
                    rule,
                    end_repeat,
                    exceptions: series
                        .exceptions
                        .iter()
                        .filter(|d| **d >= first)
                        .map(|d| shift_date(*d, day_shift))
                        .collect(),
                })
            }
        };

        let unchanged_timing = anchor == occurrence
            && patch.repeat.is_keep()
            && !patch.end_repeat.changes(series.end_repeat.as_ref());
        let mut successor = Shift::new(self.ids.next_id(), schedule);
        patch.apply_details(shift, &mut successor);
        if unchanged_timing && same_details(shift, &successor) {
            return Ok(MutationPlan::new());
        }
        validate_schedule(&successor.schedule)?;
        successor.duty = shift.duty.filter(|duty| duty.at > occurrence.start);

        tracing::debug!(
            %from,
            successor_id = %successor.id,
            "splitting series into successor"
        );
        let mut plan = MutationPlan::new();
        plan.push(SagaStep::create(successor));
        plan.extend(self.delete_following(shift, from, children)?);
        Ok(plan)
    }
}

/// Delete steps for children of `shift` anchored on or after `from`.
fn cascade(shift: &Shift, children: &[Shift], from: NaiveDate) -> MutationPlan {
    let mut plan = MutationPlan::new();
    for child in children {
        if child.parent_id.as_ref() == Some(&shift.id) && child.start().date_naive() >= from {
            tracing::debug!(child_id = %child.id, "cascading delete to child");
            plan.push(SagaStep::delete(child));
        }
    }
    plan
}

fn same_details(a: &Shift, b: &Shift) -> bool {
    a.iana_tz == b.iana_tz
        && a.saving_time == b.saving_time
        && a.resource == b.resource
        && a.alert_minutes == b.alert_minutes
}

fn shift_date(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days)).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RecurrenceRule;
    use chrono::{DateTime, TimeZone, Utc};

    struct FixedId;

    impl IdGenerator for FixedId {
        fn next_id(&self) -> ShiftId {
            ShiftId::from("new")
        }
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 10, d, h, 0, 0).unwrap()
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 10, d).unwrap()
    }

    #[test]
    fn test_rollback_reverses_applied_steps() {
        let shift = Shift::recurring("s", at(9, 8), at(9, 16), RecurrenceRule::daily(1));
        let child = Shift::single("c", at(12, 8), at(12, 16)).with_parent(shift.id.clone());
        let plan = SeriesMutator::new(&FixedId)
            .delete_following(&shift, date(11), &[child])
            .unwrap();

        assert_eq!(plan.len(), 2);
        let rollback = plan.rollback(2);
        assert_eq!(rollback[0].kind(), "create");
        assert_eq!(rollback[1].kind(), "update_recurrence");
        assert!(plan.rollback(0).is_empty());
    }

    #[test]
    fn test_intent_serde_tag() {
        let intent = Intent::Delete {
            id: ShiftId::from("x"),
        };
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["op"], "delete");
        assert_eq!(json["id"], "x");
    }
}

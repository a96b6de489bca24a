//! On/off duty status during an occurrence.
//!
//! By default a staff member is on duty when the instant falls inside an
//! occurrence that the series actually produces. A manual [`DutyOverride`]
//! keyed inside the occurrence replaces that default. A shift holds at most
//! one override; toggling again overwrites it.

use chrono::{DateTime, Utc};

use crate::model::{DutyOverride, Schedule, Shift};
use crate::occurrence::{is_series_occurrence, occurrence_at, Occurrence};

/// Duty status for `instant` during `occurrence` of `shift`.
pub fn check_duty(shift: &Shift, occurrence: &Occurrence, instant: DateTime<Utc>) -> bool {
    if occurrence.shift_id != shift.id {
        tracing::warn!(
            shift_id = %shift.id,
            occurrence_shift = %occurrence.shift_id,
            "occurrence does not belong to shift"
        );
        return false;
    }

    let range = occurrence.range();
    if !range.contains(instant) {
        return false;
    }

    // Overrides are keyed at an occurrence end, so the start instant belongs
    // to the previous back-to-back occurrence.
    match shift.duty {
        Some(DutyOverride { at, on }) if range.start < at && at <= range.end => on,
        _ => is_member(shift, occurrence),
    }
}

/// Duty status at `instant`, looking up the occurrence that contains it.
pub fn duty_at(shift: &Shift, instant: DateTime<Utc>) -> bool {
    occurrence_at(shift, instant)
        .map(|occ| check_duty(shift, &occ, instant))
        .unwrap_or(false)
}

/// A copy of `shift` whose override marks `occurrence` as on or off.
///
/// Any earlier override is replaced.
pub fn set_duty(shift: &Shift, occurrence: &Occurrence, on: bool) -> Shift {
    let mut updated = shift.clone();
    updated.duty = Some(DutyOverride {
        at: occurrence.end,
        on,
    });
    updated
}

/// Whether the schedule actually produces this occurrence.
fn is_member(shift: &Shift, occurrence: &Occurrence) -> bool {
    match &shift.schedule {
        Schedule::Single(range) => *range == occurrence.range(),
        Schedule::Recurring(series) => is_series_occurrence(series, &occurrence.range()),
    }
}

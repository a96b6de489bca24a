//! Daylight-saving batch adjustment.
//!
//! When the system declares a seasonal transition, every shift tagged with
//! the outgoing regime has its stored instants moved by one hour: +1h when
//! moving to DST, -1h when moving back to STD. If that move carries the
//! anchor start across midnight, the series' calendar data (exception dates,
//! end-of-repeat, and for weekly rules the weekday set and week start) moves
//! by the same day so every occurrence keeps its identity.
//!
//! Shifts not tagged with the outgoing regime are returned untouched, so
//! running the same transition twice changes nothing the second time.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::{Result, ShiftError};
use crate::model::{DutyOverride, SavingTime, Schedule, Series, Shift};
use crate::rule::Frequency;
use crate::series::{Intent, MutationPlan, SagaStep};
use crate::tz::TimezoneLookup;

/// Hour offset applied to stored instants when moving into `target`.
pub fn transition_delta(target: SavingTime) -> Option<Duration> {
    match target {
        SavingTime::Dst => Some(Duration::hours(1)),
        SavingTime::Std => Some(Duration::hours(-1)),
        SavingTime::None => None,
    }
}

/// The regime tag a new shift in `iana_tz` starting at `start` should carry.
pub fn saving_time_for(
    lookup: &dyn TimezoneLookup,
    iana_tz: Option<&str>,
    start: DateTime<Utc>,
) -> Result<SavingTime> {
    match iana_tz {
        Some(name) => lookup.saving_time_at(name, start),
        None => Ok(SavingTime::None),
    }
}

/// Move one shift into `target`, or `None` when it is not tagged with the
/// opposite regime.
pub fn adjust_shift(shift: &Shift, target: SavingTime) -> Result<Option<Shift>> {
    let (Some(source), Some(delta)) = (target.opposite(), transition_delta(target)) else {
        return Err(invalid_target());
    };
    if shift.saving_time != source {
        return Ok(None);
    }

    let mut adjusted = shift.clone();
    adjusted.schedule = match &shift.schedule {
        Schedule::Single(range) => Schedule::Single(range.shifted(delta)),
        Schedule::Recurring(series) => Schedule::Recurring(shift_series(series, delta)),
    };
    // The override is keyed at an occurrence end and moves with it.
    adjusted.duty = shift.duty.map(|duty| DutyOverride {
        at: duty.at + delta,
        ..duty
    });
    adjusted.saving_time = target;
    Ok(Some(adjusted))
}

fn invalid_target() -> ShiftError {
    ShiftError::Invariant("daylight-saving target must be STD or DST".to_string())
}

fn shift_series(series: &Series, delta: Duration) -> Series {
    let anchor = series.anchor.shifted(delta);
    let days = (anchor.date() - series.anchor_date()).num_days();
    if days == 0 {
        return Series {
            anchor,
            ..series.clone()
        };
    }

    let move_date = |d: NaiveDate| d.checked_add_signed(Duration::days(days)).unwrap_or(d);
    let rule = match series.rule.frequency {
        Frequency::Weekly => series.rule.rotated(days),
        Frequency::Daily => series.rule.clone(),
    };
    Series {
        anchor,
        rule,
        end_repeat: series.end_repeat.map(move_date),
        exceptions: series.exceptions.iter().copied().map(move_date).collect(),
    }
}

/// Adjust every shift in `shifts` tagged with the regime opposite `target`.
///
/// Returns only the shifts that changed, in input order.
#[tracing::instrument(skip(shifts), fields(count = shifts.len()))]
pub fn adjust_shifts(target: SavingTime, shifts: &[Shift]) -> Result<Vec<Shift>> {
    if transition_delta(target).is_none() {
        return Err(invalid_target());
    }
    let mut adjusted = Vec::new();
    for shift in shifts {
        if let Some(next) = adjust_shift(shift, target)? {
            tracing::debug!(
                shift_id = %shift.id,
                from = %shift.start(),
                to = %next.start(),
                "daylight-saving adjustment"
            );
            adjusted.push(next);
        }
    }
    tracing::debug!(adjusted = adjusted.len(), "daylight-saving batch planned");
    Ok(adjusted)
}

/// [`adjust_shifts`] as a plan of whole-record replacements, each paired
/// with the replacement restoring the original.
pub fn plan_transition(target: SavingTime, shifts: &[Shift]) -> Result<MutationPlan> {
    let mut plan = MutationPlan::new();
    for shift in shifts {
        if let Some(next) = adjust_shift(shift, target)? {
            plan.push(SagaStep {
                forward: Intent::Replace { shift: next },
                compensation: Intent::Replace {
                    shift: shift.clone(),
                },
            });
        }
    }
    Ok(plan)
}

//! Field-level validation of shift records.
//!
//! Failures are aggregated into a [`ValidationErrors`] map rather than
//! stopping at the first problem, so callers can report every bad field.

use chrono::Duration;

use crate::error::ValidationErrors;
use crate::model::{SavingTime, Schedule, Shift};
use crate::tz::TimezoneLookup;

/// Longest a single occurrence may last.
pub fn max_shift_duration() -> Duration {
    Duration::hours(24)
}

/// Timing checks that need no timezone data.
pub fn validate_schedule(schedule: &Schedule) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let anchor = schedule.anchor();
    if anchor.end <= anchor.start {
        errors.add("end", "must be after start");
    } else if anchor.duration() > max_shift_duration() {
        errors.add("end", "shift must not last longer than 24 hours");
    }

    if let Schedule::Recurring(series) = schedule {
        match series.rule.validate() {
            Err(rule_errors) => errors.merge_prefixed("repeat", rule_errors),
            Ok(()) if !series.rule.occurs_on(series.anchor_date(), series.anchor_date()) => {
                errors.add("repeat.weekdays", "must include the first occurrence's weekday");
            }
            Ok(()) => {}
        }
        if let Some(end_repeat) = series.end_repeat {
            if end_repeat < series.anchor_date() {
                errors.add("end_repeat", "must not be before the first occurrence");
            }
        }
    }
    errors.into_result()
}

/// Every check on a shift, including timezone and alert fields.
pub fn validate_shift(shift: &Shift, tz: &dyn TimezoneLookup) -> Result<(), ValidationErrors> {
    let mut errors = match validate_schedule(&shift.schedule) {
        Ok(()) => ValidationErrors::new(),
        Err(errors) => errors,
    };

    match &shift.iana_tz {
        Some(name) if !tz.is_valid(name) => {
            errors.add("iana_tz", format!("unknown timezone '{name}'"));
        }
        None if shift.saving_time != SavingTime::None => {
            errors.add("saving_time", "requires a timezone");
        }
        _ => {}
    }

    if shift.alert_minutes.is_some_and(|minutes| minutes < 0) {
        errors.add("alert_minutes", "must not be negative");
    }
    errors.into_result()
}

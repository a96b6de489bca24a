//! Detect overlapping occurrences between a candidate and existing shifts.
//!
//! Both sides are materialized over the same lookahead window (one year from
//! the candidate's start by default) and compared pairwise. Two occurrences
//! overlap when `a.start < b.end && a.end > b.start`; occurrences that merely
//! abut are not conflicts. Instants are compared at the configured
//! resolution (whole minutes by default), so `08:59:00-09:00:01` abuts a
//! shift starting at `09:00`. Occurrences shorter than the resolution that
//! would truncate to nothing keep their exact instants.
//!
//! The first conflict found wins. Existing shifts are visited in the order
//! given (storage order) and candidate dates in ascending order, so the
//! reported conflict is deterministic for a given input.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Duration, DurationRound, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Result, ShiftError};
use crate::model::{Schedule, Shift, ShiftId, TimeRange};
use crate::occurrence::{group_by_date, materialize};

/// A candidate occurrence colliding with an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// The existing shift that collides.
    pub shift_id: ShiftId,
    /// Its workplace, when known.
    pub resource: Option<String>,
    pub candidate: TimeRange,
    pub existing: TimeRange,
}

impl Conflict {
    /// The overlapping part of the two occurrences.
    pub fn overlap(&self) -> TimeRange {
        TimeRange::new(
            self.candidate.start.max(self.existing.start),
            self.candidate.end.min(self.existing.end),
        )
    }

    pub fn overlap_minutes(&self) -> i64 {
        self.overlap().duration().num_minutes()
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(
                f,
                "Shift overlaps with an existing shift at {} ({})",
                resource, self.existing
            ),
            None => write!(f, "Shift overlaps with an existing shift ({})", self.existing),
        }
    }
}

/// The window conflict search runs over for a schedule.
pub fn lookahead_window(schedule: &Schedule, config: &EngineConfig) -> TimeRange {
    let start = schedule.anchor().start;
    TimeRange::new(start, start + config.lookahead())
}

/// First pair of overlapping occurrences between `candidate` and `other`
/// within `window`, as `(candidate_range, other_range)`.
///
/// Occurrences may cross midnight, so each candidate date is compared with
/// the other side's ranges on the same date and on both neighbouring dates.
pub fn first_overlap(
    candidate: &Schedule,
    other: &Schedule,
    window: &TimeRange,
    config: &EngineConfig,
) -> Option<(TimeRange, TimeRange)> {
    let ours = group_by_date(&materialize(candidate, window));
    if ours.is_empty() {
        return None;
    }
    let theirs = group_by_date(&materialize(other, window));
    first_overlap_grouped(&ours, &theirs, config.overlap_resolution())
}

fn first_overlap_grouped(
    ours: &BTreeMap<NaiveDate, Vec<TimeRange>>,
    theirs: &BTreeMap<NaiveDate, Vec<TimeRange>>,
    resolution: Duration,
) -> Option<(TimeRange, TimeRange)> {
    for (date, our_ranges) in ours {
        for offset in [-1, 0, 1] {
            let Some(day) = date.checked_add_signed(Duration::days(offset)) else {
                continue;
            };
            let Some(their_ranges) = theirs.get(&day) else {
                continue;
            };
            for a in our_ranges {
                let coarse_a = truncate(a, resolution);
                if let Some(b) = their_ranges
                    .iter()
                    .find(|b| coarse_a.overlaps(&truncate(b, resolution)))
                {
                    return Some((*a, *b));
                }
            }
        }
    }
    None
}

/// `range` with both ends truncated to `resolution`. A range that would
/// collapse to nothing is compared at full precision instead.
fn truncate(range: &TimeRange, resolution: Duration) -> TimeRange {
    let coarse = TimeRange::new(
        range.start.duration_trunc(resolution).unwrap_or(range.start),
        range.end.duration_trunc(resolution).unwrap_or(range.end),
    );
    if coarse.start >= coarse.end && range.start < range.end {
        *range
    } else {
        coarse
    }
}

/// Whether two schedules overlap anywhere in the lookahead window starting
/// at the earlier of their anchors. Symmetric in its arguments.
pub fn overlaps(a: &Schedule, b: &Schedule, config: &EngineConfig) -> bool {
    let start = a.anchor().start.min(b.anchor().start);
    let window = TimeRange::new(start, start + config.lookahead());
    first_overlap(a, b, &window, config).is_some()
}

/// Find the first existing shift whose occurrences collide with the candidate's.
///
/// Shifts sharing `exclude` (normally the shift being edited) are skipped.
pub fn find_conflict(
    candidate: &Schedule,
    existing: &[Shift],
    exclude: Option<&ShiftId>,
    config: &EngineConfig,
) -> Option<Conflict> {
    let window = lookahead_window(candidate, config);
    let ours = group_by_date(&materialize(candidate, &window));
    if ours.is_empty() {
        return None;
    }

    for shift in existing {
        if exclude == Some(&shift.id) {
            continue;
        }
        let theirs = group_by_date(&materialize(&shift.schedule, &window));
        if let Some((candidate_range, existing_range)) =
            first_overlap_grouped(&ours, &theirs, config.overlap_resolution())
        {
            tracing::debug!(
                shift_id = %shift.id,
                candidate = %candidate_range,
                existing = %existing_range,
                "overlap detected"
            );
            return Some(Conflict {
                shift_id: shift.id.clone(),
                resource: shift.resource.clone(),
                candidate: candidate_range,
                existing: existing_range,
            });
        }
    }
    None
}

/// [`find_conflict`] as a `Result`, for callers that treat overlap as an error.
pub fn ensure_no_conflict(
    candidate: &Schedule,
    existing: &[Shift],
    exclude: Option<&ShiftId>,
    config: &EngineConfig,
) -> Result<()> {
    match find_conflict(candidate, existing, exclude, config) {
        Some(conflict) => Err(ShiftError::from(conflict)),
        None => Ok(()),
    }
}

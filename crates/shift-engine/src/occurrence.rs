//! Materialize a schedule into concrete occurrences.
//!
//! Generation is pure and restartable: the same schedule and window always
//! give the same ordered output. Occurrences are dated by the UTC calendar
//! date of their start, which is also the reference for exception dates and
//! end-of-repeat.
//!
//! # Functions
//!
//! - [`materialize`] — schedule + window → ordered dated ranges
//! - [`occurrences`] — the same, tagged with the source shift
//! - [`group_by_date`] — date → ranges map for pairwise comparison
//! - [`occurrence_at`] / [`next_occurrence`] — point lookups
//! - [`previous_occurrence_date`] / [`has_other_occurrence`] — series neighbour searches
//! - [`is_series_occurrence`] — membership of a concrete range

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Schedule, Series, Shift, ShiftId, TimeRange};

/// One concrete occurrence of a shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub shift_id: ShiftId,
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Occurrence {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

/// An occurrence's date and time range, without the shift reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedRange {
    pub date: NaiveDate,
    pub range: TimeRange,
}

/// Valid occurrence dates of a series, ascending, starting at a given date.
///
/// Skips exceptions and stops after end-of-repeat. Unbounded when the series
/// has no end-of-repeat; callers bound it with `take_while`.
#[derive(Debug, Clone)]
pub struct SeriesDates<'a> {
    series: &'a Series,
    cursor: Option<NaiveDate>,
}

impl<'a> SeriesDates<'a> {
    pub fn new(series: &'a Series, from: NaiveDate) -> Self {
        Self {
            series,
            cursor: Some(from),
        }
    }
}

impl Iterator for SeriesDates<'_> {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        loop {
            let from = self.cursor?;
            let date = self
                .series
                .rule
                .next_on_or_after(self.series.anchor_date(), from);
            let date = match (date, self.series.end_repeat) {
                (Some(d), Some(end)) if d > end => None,
                (d, _) => d,
            };
            let Some(date) = date else {
                self.cursor = None;
                return None;
            };
            self.cursor = date.succ_opt();
            if !self.series.exceptions.contains(&date) {
                return Some(date);
            }
        }
    }
}

/// Every occurrence of `schedule` that intersects `window`, in date order.
///
/// A single event yields its anchor iff the anchor intersects the window.
/// A series steps through its rule from the anchor date, skipping exception
/// dates and stopping once the date passes end-of-repeat or the window end.
pub fn materialize(schedule: &Schedule, window: &TimeRange) -> Vec<DatedRange> {
    match schedule {
        Schedule::Single(range) => {
            if range.overlaps(window) {
                vec![DatedRange {
                    date: range.date(),
                    range: *range,
                }]
            } else {
                Vec::new()
            }
        }
        Schedule::Recurring(series) => {
            // An occurrence dated the day before the window can still reach into it.
            let lead = series.anchor.duration().max(Duration::zero());
            let first_date = (window.start - lead).date_naive();
            let last_date = window.end.date_naive();

            let result: Vec<DatedRange> = SeriesDates::new(series, first_date)
                .take_while(|date| *date <= last_date)
                .map(|date| DatedRange {
                    date,
                    range: series.occurrence_on(date),
                })
                .filter(|occ| occ.range.overlaps(window))
                .collect();

            tracing::trace!(
                window = %window,
                count = result.len(),
                "materialized series occurrences"
            );
            result
        }
    }
}

/// [`materialize`] for a shift, tagging each occurrence with its id.
pub fn occurrences(shift: &Shift, window: &TimeRange) -> Vec<Occurrence> {
    materialize(&shift.schedule, window)
        .into_iter()
        .map(|dated| Occurrence {
            shift_id: shift.id.clone(),
            date: dated.date,
            start: dated.range.start,
            end: dated.range.end,
        })
        .collect()
}

/// Group dated ranges by calendar date, preserving order within a date.
pub fn group_by_date(dated: &[DatedRange]) -> BTreeMap<NaiveDate, Vec<TimeRange>> {
    let mut grouped: BTreeMap<NaiveDate, Vec<TimeRange>> = BTreeMap::new();
    for occ in dated {
        grouped.entry(occ.date).or_default().push(occ.range);
    }
    grouped
}

/// The occurrence whose `[start, end]` contains `instant`, if any.
///
/// When two occurrences touch (one ends as the next starts) the earlier wins.
pub fn occurrence_at(shift: &Shift, instant: DateTime<Utc>) -> Option<Occurrence> {
    let span = shift.schedule.anchor().duration().max(Duration::zero());
    let window = TimeRange::new(instant - span - Duration::days(1), instant + Duration::days(1));
    occurrences(shift, &window)
        .into_iter()
        .find(|occ| occ.range().contains(instant))
}

/// The first occurrence starting at or after `after`.
///
/// Searches at most `horizon` ahead so an exhausted or heavily excepted
/// series cannot loop forever.
pub fn next_occurrence(
    shift: &Shift,
    after: DateTime<Utc>,
    horizon: Duration,
) -> Option<Occurrence> {
    match &shift.schedule {
        Schedule::Single(range) => (range.start >= after && range.start <= after + horizon)
            .then(|| Occurrence {
                shift_id: shift.id.clone(),
                date: range.date(),
                start: range.start,
                end: range.end,
            }),
        Schedule::Recurring(series) => {
            let limit = (after + horizon).date_naive();
            SeriesDates::new(series, after.date_naive())
                .take_while(|date| *date <= limit)
                .map(|date| (date, series.occurrence_on(date)))
                .find(|(_, range)| range.start >= after)
                .map(|(date, range)| Occurrence {
                    shift_id: shift.id.clone(),
                    date,
                    start: range.start,
                    end: range.end,
                })
        }
    }
}

/// The last valid occurrence date strictly before `before`.
///
/// Honours exceptions and end-of-repeat; `None` when no occurrence precedes it.
pub fn previous_occurrence_date(series: &Series, before: NaiveDate) -> Option<NaiveDate> {
    let mut cursor = match series.end_repeat.and_then(|end| end.succ_opt()) {
        Some(limit) => before.min(limit),
        None => before,
    };
    loop {
        let date = series.rule.previous_before(series.anchor_date(), cursor)?;
        if !series.exceptions.contains(&date) {
            return Some(date);
        }
        cursor = date;
    }
}

/// Whether `range` is exactly the occurrence the series produces on its date.
pub fn is_series_occurrence(series: &Series, range: &TimeRange) -> bool {
    series.is_occurrence_date(range.date()) && series.occurrence_on(range.date()) == *range
}

/// Whether the series still has a valid occurrence on some date other than `date`.
pub fn has_other_occurrence(series: &Series, date: NaiveDate) -> bool {
    if series.end_repeat.is_none() {
        // Validated rules repeat forever without an end.
        return true;
    }
    SeriesDates::new(series, series.anchor_date()).any(|d| d != date)
}

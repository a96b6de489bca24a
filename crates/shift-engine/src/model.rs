//! Shift records and the value types they are built from.
//!
//! A [`Shift`] is the stored definition; its timing lives in a [`Schedule`],
//! which is either a single event or a recurring [`Series`]. Consumers must
//! match on the schedule, so the "no repeat rule" case cannot be forgotten.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::rule::RecurrenceRule;

/// Opaque shift identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShiftId(pub String);

impl ShiftId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShiftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShiftId {
    fn from(s: &str) -> Self {
        ShiftId(s.to_string())
    }
}

impl From<String> for ShiftId {
    fn from(s: String) -> Self {
        ShiftId(s)
    }
}

/// Mints identifiers for shifts created by series mutations.
///
/// Injected into [`crate::series::SeriesMutator`]; the generator must outlive
/// the mutator borrowing it.
pub trait IdGenerator {
    fn next_id(&self) -> ShiftId;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> ShiftId {
        ShiftId(uuid::Uuid::new_v4().to_string())
    }
}

/// A span between two UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Half-open intersection: ranges that merely touch do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Closed containment: both endpoints count.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    pub fn shifted(&self, by: Duration) -> TimeRange {
        TimeRange::new(self.start + by, self.end + by)
    }

    /// Calendar date of the start, in UTC.
    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Offset regime the stored instants of a shift currently reflect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SavingTime {
    /// The shift's timezone does not observe daylight saving (or has none).
    #[default]
    None,
    Std,
    Dst,
}

impl SavingTime {
    /// The regime a shift must be in to move into `self`.
    pub fn opposite(self) -> Option<SavingTime> {
        match self {
            SavingTime::None => None,
            SavingTime::Std => Some(SavingTime::Dst),
            SavingTime::Dst => Some(SavingTime::Std),
        }
    }
}

/// Manual duty toggle, keyed by the end instant of the occurrence it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyOverride {
    pub at: DateTime<Utc>,
    pub on: bool,
}

/// A recurring series: the first occurrence plus how it repeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub anchor: TimeRange,
    pub rule: RecurrenceRule,
    /// Inclusive last date on which the series may occur.
    #[serde(default)]
    pub end_repeat: Option<NaiveDate>,
    /// Dates whose occurrence is suppressed.
    #[serde(default)]
    pub exceptions: BTreeSet<NaiveDate>,
}

impl Series {
    pub fn new(anchor: TimeRange, rule: RecurrenceRule) -> Self {
        Self {
            anchor,
            rule,
            end_repeat: None,
            exceptions: BTreeSet::new(),
        }
    }

    pub fn anchor_date(&self) -> NaiveDate {
        self.anchor.date()
    }

    /// The rule puts an occurrence on `date`, it is not excepted, and it is
    /// within end-of-repeat.
    pub fn is_occurrence_date(&self, date: NaiveDate) -> bool {
        self.rule.occurs_on(self.anchor_date(), date)
            && !self.exceptions.contains(&date)
            && self.end_repeat.is_none_or(|end| date <= end)
    }

    /// The anchor's time of day applied to `date`, duration preserved.
    pub fn occurrence_on(&self, date: NaiveDate) -> TimeRange {
        let start = Utc.from_utc_datetime(&date.and_time(self.anchor.start.time()));
        TimeRange::new(start, start + self.anchor.duration())
    }
}

/// When a shift happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    Single(TimeRange),
    Recurring(Series),
}

impl Schedule {
    /// The first (or only) occurrence.
    pub fn anchor(&self) -> &TimeRange {
        match self {
            Schedule::Single(range) => range,
            Schedule::Recurring(series) => &series.anchor,
        }
    }

    pub fn series(&self) -> Option<&Series> {
        match self {
            Schedule::Single(_) => None,
            Schedule::Recurring(series) => Some(series),
        }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, Schedule::Recurring(_))
    }
}

/// The stored recurring (or single) shift definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub id: ShiftId,
    pub schedule: Schedule,
    #[serde(default)]
    pub iana_tz: Option<String>,
    #[serde(default)]
    pub saving_time: SavingTime,
    #[serde(default)]
    pub duty: Option<DutyOverride>,
    /// Set on shifts split off a recurring series.
    #[serde(default)]
    pub parent_id: Option<ShiftId>,
    /// Workplace the shift belongs to, used to name conflicts.
    #[serde(default)]
    pub resource: Option<String>,
    /// Minutes before start at which the assignee is alerted.
    #[serde(default)]
    pub alert_minutes: Option<i64>,
}

impl Shift {
    pub fn new(id: impl Into<ShiftId>, schedule: Schedule) -> Self {
        Self {
            id: id.into(),
            schedule,
            iana_tz: None,
            saving_time: SavingTime::None,
            duty: None,
            parent_id: None,
            resource: None,
            alert_minutes: None,
        }
    }

    pub fn single(id: impl Into<ShiftId>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::new(id, Schedule::Single(TimeRange::new(start, end)))
    }

    pub fn recurring(
        id: impl Into<ShiftId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        rule: RecurrenceRule,
    ) -> Self {
        Self::new(
            id,
            Schedule::Recurring(Series::new(TimeRange::new(start, end), rule)),
        )
    }

    /// Set end-of-repeat. No effect on single shifts.
    pub fn with_end_repeat(mut self, end_repeat: NaiveDate) -> Self {
        if let Schedule::Recurring(series) = &mut self.schedule {
            series.end_repeat = Some(end_repeat);
        }
        self
    }

    /// Add exception dates. No effect on single shifts.
    pub fn with_exceptions(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        if let Schedule::Recurring(series) = &mut self.schedule {
            series.exceptions.extend(dates);
        }
        self
    }

    pub fn with_timezone(mut self, iana_tz: impl Into<String>, saving_time: SavingTime) -> Self {
        self.iana_tz = Some(iana_tz.into());
        self.saving_time = saving_time;
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_parent(mut self, parent: ShiftId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.schedule.anchor().start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.schedule.anchor().end
    }

    pub fn series(&self) -> Option<&Series> {
        self.schedule.series()
    }
}

/// Three-state field update: leave unchanged, clear to null, or set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum Patch<T> {
    Keep,
    Clear,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T: Clone + PartialEq> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    /// The value a field holding `current` ends up with.
    pub fn apply(&self, current: Option<&T>) -> Option<T> {
        match self {
            Patch::Keep => current.cloned(),
            Patch::Clear => None,
            Patch::Set(value) => Some(value.clone()),
        }
    }

    /// Whether applying the patch to `current` changes it.
    pub fn changes(&self, current: Option<&T>) -> bool {
        self.apply(current).as_ref() != current
    }
}

/// Edited fields for the edit-one / edit-all-future operations.
///
/// `start` and `end` address the edited occurrence, not the series anchor.
/// Required fields use `Option` (absent means unchanged); nullable fields
/// use [`Patch`] so "clear" and "leave alone" stay distinct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftPatch {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repeat: Patch<RecurrenceRule>,
    #[serde(default)]
    pub end_repeat: Patch<NaiveDate>,
    #[serde(default)]
    pub iana_tz: Patch<String>,
    #[serde(default)]
    pub saving_time: Option<SavingTime>,
    #[serde(default)]
    pub resource: Patch<String>,
    #[serde(default)]
    pub alert_minutes: Patch<i64>,
}

impl ShiftPatch {
    /// Occurrence times after the patch, given the occurrence being edited.
    pub fn range_for(&self, occurrence: &TimeRange) -> TimeRange {
        TimeRange::new(
            self.start.unwrap_or(occurrence.start),
            self.end.unwrap_or(occurrence.end),
        )
    }

    /// Apply the non-timing fields onto a copy of `base`.
    pub fn apply_details(&self, base: &Shift, target: &mut Shift) {
        target.iana_tz = self.iana_tz.apply(base.iana_tz.as_ref());
        target.saving_time = self.saving_time.unwrap_or(base.saving_time);
        target.resource = self.resource.apply(base.resource.as_ref());
        target.alert_minutes = self.alert_minutes.apply(base.alert_minutes.as_ref());
    }
}

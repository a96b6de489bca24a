//! Recurrence rules: how often a shift repeats.
//!
//! A rule is pure data: a [`Frequency`], an interval (`every`), and for
//! weekly rules the set of weekdays plus the day the interval week starts on.
//! The only behaviour here is date membership ("does the series starting on
//! `anchor` occur on `date`?") and the neighbour searches built on it.
//!
//! Rules can be imported from and exported to the RFC 5545 `RRULE` subset
//! they correspond to (`FREQ=DAILY|WEEKLY;INTERVAL;BYDAY;WKST`).

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rrule::{NWeekday, RRule, Unvalidated};
use serde::{Deserialize, Serialize};

use crate::error::{ShiftError, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    Daily,
    Weekly,
}

/// How a series repeats.
///
/// `every` is deliberately signed so that invalid input survives
/// deserialization and is reported by [`RecurrenceRule::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Interval: every N days or every N weeks.
    pub every: i32,
    /// Applicable weekdays (weekly rules only).
    #[serde(default)]
    pub weekdays: Vec<Weekday>,
    /// First day of an interval week (weekly rules only).
    #[serde(default = "default_week_start")]
    pub week_start: Weekday,
}

fn default_week_start() -> Weekday {
    Weekday::Mon
}

impl RecurrenceRule {
    pub fn daily(every: i32) -> Self {
        Self {
            frequency: Frequency::Daily,
            every,
            weekdays: Vec::new(),
            week_start: Weekday::Mon,
        }
    }

    pub fn weekly(every: i32, weekdays: impl IntoIterator<Item = Weekday>) -> Self {
        let mut rule = Self {
            frequency: Frequency::Weekly,
            every,
            weekdays: weekdays.into_iter().collect(),
            week_start: Weekday::Mon,
        };
        rule.normalize();
        rule
    }

    pub fn with_week_start(mut self, week_start: Weekday) -> Self {
        self.week_start = week_start;
        self.normalize();
        self
    }

    /// Sort weekdays by their position in the interval week and drop duplicates.
    pub fn normalize(&mut self) {
        let week_start = self.week_start;
        self.weekdays
            .sort_by_key(|wd| days_from_week_start(*wd, week_start));
        self.weekdays.dedup();
    }

    /// Check the rule's own fields. Field names are relative to the rule.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.every < 1 {
            errors.add("every", "must be at least 1");
        }
        if self.frequency == Frequency::Weekly && self.weekdays.is_empty() {
            errors.add("weekdays", "must contain at least one weekday");
        }
        errors.into_result()
    }

    /// Interval as a day/week count. Rules with `every < 1` never pass
    /// validation; they are treated as 1 here so date arithmetic stays total.
    fn interval(&self) -> i64 {
        i64::from(self.every.max(1))
    }

    /// Whether a series anchored on `anchor` has a candidate occurrence on `date`.
    ///
    /// Exceptions and end-of-repeat are not considered here.
    pub fn occurs_on(&self, anchor: NaiveDate, date: NaiveDate) -> bool {
        if date < anchor {
            return false;
        }
        match self.frequency {
            Frequency::Daily => (date - anchor).num_days() % self.interval() == 0,
            Frequency::Weekly => {
                self.weekdays.contains(&date.weekday())
                    && self.week_index(anchor, date) % self.interval() == 0
            }
        }
    }

    /// First candidate date on or after `from` (never before `anchor`).
    pub fn next_on_or_after(&self, anchor: NaiveDate, from: NaiveDate) -> Option<NaiveDate> {
        let from = from.max(anchor);
        match self.frequency {
            Frequency::Daily => {
                let rem = (from - anchor).num_days() % self.interval();
                if rem == 0 {
                    Some(from)
                } else {
                    from.checked_add_signed(Duration::days(self.interval() - rem))
                }
            }
            Frequency::Weekly => {
                if self.weekdays.is_empty() {
                    return None;
                }
                let mut cursor = from;
                loop {
                    let index = self.week_index(anchor, cursor);
                    let rem = index % self.interval();
                    if rem != 0 {
                        // Jump to the first day of the next active week.
                        let week = self.week_begin(cursor);
                        cursor = week.checked_add_signed(Duration::weeks(self.interval() - rem))?;
                        continue;
                    }
                    let week_end = self.week_begin(cursor) + Duration::days(6);
                    while cursor <= week_end {
                        if self.weekdays.contains(&cursor.weekday()) {
                            return Some(cursor);
                        }
                        cursor = cursor.succ_opt()?;
                    }
                }
            }
        }
    }

    /// Last candidate date strictly before `before`, or `None` when that
    /// would precede `anchor`.
    pub fn previous_before(&self, anchor: NaiveDate, before: NaiveDate) -> Option<NaiveDate> {
        if before <= anchor {
            return None;
        }
        match self.frequency {
            Frequency::Daily => {
                let last = before.pred_opt()?;
                let rem = (last - anchor).num_days() % self.interval();
                Some(last - Duration::days(rem))
            }
            Frequency::Weekly => {
                // An active week holds at least one candidate, so one full
                // interval of weeks back is always enough.
                let horizon = 7 * self.interval() + 7;
                let mut cursor = before.pred_opt()?;
                for _ in 0..horizon {
                    if cursor < anchor {
                        return None;
                    }
                    if self.occurs_on(anchor, cursor) {
                        return Some(cursor);
                    }
                    cursor = cursor.pred_opt()?;
                }
                None
            }
        }
    }

    /// Rotate weekdays and week start by `days`, keeping weekly occurrences
    /// aligned when every occurrence's date moves by the same amount.
    pub fn rotated(&self, days: i64) -> Self {
        let rotate = |wd: Weekday| -> Weekday {
            let n = (i64::from(wd.num_days_from_monday()) + days).rem_euclid(7);
            weekday_from_monday(n as u32)
        };
        let mut rule = Self {
            frequency: self.frequency,
            every: self.every,
            weekdays: self.weekdays.iter().copied().map(rotate).collect(),
            week_start: rotate(self.week_start),
        };
        rule.normalize();
        rule
    }

    /// Parse a `FREQ=DAILY|WEEKLY` RRULE (with or without the `RRULE:` prefix).
    ///
    /// `COUNT`, `UNTIL` and the `BYMONTH`/`BYMONTHDAY`/`BYSETPOS` parts are
    /// rejected: end-of-repeat is carried separately on the series.
    pub fn from_rrule(s: &str) -> Result<Self, ShiftError> {
        let body = s.trim();
        let body = body.strip_prefix("RRULE:").unwrap_or(body);
        let parsed = body
            .parse::<RRule<Unvalidated>>()
            .map_err(|e| ShiftError::InvalidRule(format!("'{}': {}", s, e)))?;

        let frequency = match parsed.get_freq() {
            rrule::Frequency::Daily => Frequency::Daily,
            rrule::Frequency::Weekly => Frequency::Weekly,
            other => {
                return Err(ShiftError::InvalidRule(format!(
                    "unsupported frequency {other:?}"
                )))
            }
        };
        if parsed.get_count().is_some() || parsed.get_until().is_some() {
            return Err(ShiftError::InvalidRule(
                "COUNT and UNTIL are not supported; use end_repeat".to_string(),
            ));
        }
        if !parsed.get_by_month().is_empty()
            || !parsed.get_by_month_day().is_empty()
            || !parsed.get_by_set_pos().is_empty()
        {
            return Err(ShiftError::InvalidRule(
                "only FREQ, INTERVAL, BYDAY and WKST are supported".to_string(),
            ));
        }

        let mut weekdays = Vec::new();
        for nwd in parsed.get_by_weekday() {
            match nwd {
                NWeekday::Every(wd) => weekdays.push(*wd),
                NWeekday::Nth(..) => {
                    return Err(ShiftError::InvalidRule(
                        "ordinal BYDAY values are not supported".to_string(),
                    ))
                }
            }
        }

        let mut rule = Self {
            frequency,
            every: i32::from(parsed.get_interval()),
            weekdays,
            week_start: parsed.get_week_start(),
        };
        rule.normalize();
        Ok(rule)
    }

    /// Render as an RRULE value (without the `RRULE:` prefix).
    pub fn to_rrule(&self) -> String {
        match self.frequency {
            Frequency::Daily => format!("FREQ=DAILY;INTERVAL={}", self.every),
            Frequency::Weekly => {
                let days: Vec<&str> = self.weekdays.iter().map(|wd| weekday_code(*wd)).collect();
                format!(
                    "FREQ=WEEKLY;INTERVAL={};BYDAY={};WKST={}",
                    self.every,
                    days.join(","),
                    weekday_code(self.week_start)
                )
            }
        }
    }

    fn week_begin(&self, date: NaiveDate) -> NaiveDate {
        date - Duration::days(days_from_week_start(date.weekday(), self.week_start))
    }

    /// Number of interval weeks between the week holding `anchor` and the one holding `date`.
    fn week_index(&self, anchor: NaiveDate, date: NaiveDate) -> i64 {
        (self.week_begin(date) - self.week_begin(anchor)).num_days() / 7
    }
}

/// How many days `weekday` is from the week-start day.
fn days_from_week_start(weekday: Weekday, week_start: Weekday) -> i64 {
    let wd = i64::from(weekday.num_days_from_monday());
    let ws = i64::from(week_start.num_days_from_monday());
    (wd - ws).rem_euclid(7)
}

fn weekday_from_monday(n: u32) -> Weekday {
    match n {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

fn weekday_code(wd: Weekday) -> &'static str {
    match wd {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let errors = RecurrenceRule::daily(0).validate().unwrap_err();
        assert!(errors.contains("every"));
    }

    #[test]
    fn test_validate_rejects_empty_weekly_set() {
        let errors = RecurrenceRule::weekly(1, []).validate().unwrap_err();
        assert!(errors.contains("weekdays"));
        assert!(!errors.contains("every"));
    }

    #[test]
    fn test_daily_every_three() {
        let rule = RecurrenceRule::daily(3);
        let anchor = date(2021, 10, 9);
        assert!(rule.occurs_on(anchor, anchor));
        assert!(!rule.occurs_on(anchor, date(2021, 10, 10)));
        assert!(rule.occurs_on(anchor, date(2021, 10, 12)));
        assert!(!rule.occurs_on(anchor, date(2021, 10, 6)));
    }

    #[test]
    fn test_weekly_biweekly_multi_day() {
        // Tue 2026-01-06 anchor, every 2 weeks on TU,TH
        let rule = RecurrenceRule::weekly(2, [Weekday::Thu, Weekday::Tue]);
        let anchor = date(2026, 1, 6);
        assert!(rule.occurs_on(anchor, date(2026, 1, 8)));
        assert!(!rule.occurs_on(anchor, date(2026, 1, 13)));
        assert!(rule.occurs_on(anchor, date(2026, 1, 20)));
        assert_eq!(rule.weekdays, vec![Weekday::Tue, Weekday::Thu]);
    }

    #[test]
    fn test_next_on_or_after_skips_inactive_week() {
        let rule = RecurrenceRule::weekly(2, [Weekday::Tue, Weekday::Thu]);
        let anchor = date(2026, 1, 6);
        assert_eq!(
            rule.next_on_or_after(anchor, date(2026, 1, 9)),
            Some(date(2026, 1, 20))
        );
        assert_eq!(
            rule.next_on_or_after(anchor, date(2025, 12, 1)),
            Some(anchor)
        );
    }

    #[test]
    fn test_previous_before() {
        let daily = RecurrenceRule::daily(2);
        let anchor = date(2021, 10, 9);
        assert_eq!(
            daily.previous_before(anchor, date(2021, 10, 14)),
            Some(date(2021, 10, 13))
        );
        assert_eq!(
            daily.previous_before(anchor, date(2021, 10, 13)),
            Some(date(2021, 10, 11))
        );
        assert_eq!(daily.previous_before(anchor, anchor), None);

        let weekly = RecurrenceRule::weekly(1, [Weekday::Sat]);
        assert_eq!(
            weekly.previous_before(anchor, date(2021, 10, 23)),
            Some(date(2021, 10, 16))
        );
    }

    #[test]
    fn test_rotated_round_trip() {
        let rule = RecurrenceRule::weekly(2, [Weekday::Sat, Weekday::Sun]);
        let forward = rule.rotated(1);
        assert_eq!(forward.weekdays, vec![Weekday::Sun, Weekday::Mon]);
        assert_eq!(forward.week_start, Weekday::Tue);
        assert_eq!(forward.rotated(-1), rule);
    }

    #[test]
    fn test_rotated_keeps_biweekly_alignment() {
        // Sat+Sun every other week; after moving every date forward one day
        // the Sun and Mon pairs must still fall in the same interval weeks.
        let rule = RecurrenceRule::weekly(2, [Weekday::Sat, Weekday::Sun]);
        let anchor = date(2021, 10, 9);
        let rotated = rule.rotated(1);
        let rotated_anchor = date(2021, 10, 10);

        let mut d = anchor;
        while d < date(2021, 12, 31) {
            assert_eq!(
                rule.occurs_on(anchor, d),
                rotated.occurs_on(rotated_anchor, d.succ_opt().unwrap()),
                "mismatch at {d}"
            );
            d = d.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_rrule_round_trip() {
        let rule = RecurrenceRule::weekly(2, [Weekday::Mon, Weekday::Wed]);
        let text = rule.to_rrule();
        assert_eq!(text, "FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE;WKST=MO");
        assert_eq!(RecurrenceRule::from_rrule(&text).unwrap(), rule);
    }

    #[test]
    fn test_rrule_daily_with_prefix() {
        let rule = RecurrenceRule::from_rrule("RRULE:FREQ=DAILY;INTERVAL=3").unwrap();
        assert_eq!(rule, RecurrenceRule::daily(3));
    }

    #[test]
    fn test_rrule_rejects_monthly() {
        let err = RecurrenceRule::from_rrule("FREQ=MONTHLY;BYMONTHDAY=1").unwrap_err();
        assert!(err.to_string().contains("Invalid RRULE"), "got: {err}");
    }

    #[test]
    fn test_rrule_rejects_count() {
        assert!(RecurrenceRule::from_rrule("FREQ=DAILY;COUNT=5").is_err());
    }
}

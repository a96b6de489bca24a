//! Property tests over generated schedules.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use proptest::prelude::*;
use shift_engine::{
    adjust_shift, materialize, overlaps, validate_schedule, DutyOverride, EngineConfig, Frequency,
    RecurrenceRule, SavingTime, Schedule, Series, Shift, TimeRange,
};

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()
}

fn base_date() -> NaiveDate {
    base().date_naive()
}

fn rule_strategy() -> impl Strategy<Value = RecurrenceRule> {
    prop_oneof![
        (1i32..=4).prop_map(RecurrenceRule::daily),
        (
            1i32..=3,
            prop::sample::subsequence(WEEK.to_vec(), 1..=7),
            prop::sample::select(WEEK.to_vec()),
        )
            .prop_map(|(every, days, start)| {
                RecurrenceRule::weekly(every, days).with_week_start(start)
            }),
    ]
}

fn anchor_strategy() -> impl Strategy<Value = TimeRange> {
    (0i64..60, 0i64..96, 1i64..=96).prop_map(|(day, quarter, len)| {
        let start = base() + Duration::days(day) + Duration::minutes(quarter * 15);
        TimeRange::new(start, start + Duration::minutes(len * 15))
    })
}

fn series_strategy() -> impl Strategy<Value = Series> {
    (
        anchor_strategy(),
        rule_strategy(),
        prop::collection::btree_set(0i64..150, 0..8),
        prop::option::of(0i64..200),
    )
        .prop_map(|(anchor, mut rule, exceptions, end)| {
            // The anchor is the first occurrence, so a weekly rule covers its weekday.
            if rule.frequency == Frequency::Weekly {
                rule.weekdays.push(anchor.start.weekday());
                rule.normalize();
            }
            Series {
                anchor,
                rule,
                end_repeat: end.map(|d| base_date() + Duration::days(d)),
                exceptions: exceptions
                    .into_iter()
                    .map(|d| base_date() + Duration::days(d))
                    .collect(),
            }
        })
}

fn window_for(series: &Series) -> TimeRange {
    let start = series.anchor.start - Duration::days(2);
    TimeRange::new(start, start + Duration::days(120))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Generation is deterministic and strictly date-ordered.
    #[test]
    fn generation_is_deterministic(series in series_strategy()) {
        let schedule = Schedule::Recurring(series.clone());
        let window = window_for(&series);
        let first = materialize(&schedule, &window);
        let second = materialize(&schedule, &window);
        prop_assert_eq!(&first, &second);
        prop_assert!(first.windows(2).all(|w| w[0].date < w[1].date));
    }

    /// Every generated date is a real occurrence: on the rule, not excepted,
    /// no earlier than the anchor and no later than end-of-repeat.
    #[test]
    fn generated_dates_honour_series_bounds(series in series_strategy()) {
        let dated = materialize(&Schedule::Recurring(series.clone()), &window_for(&series));
        for occ in &dated {
            prop_assert!(!series.exceptions.contains(&occ.date));
            prop_assert!(occ.date >= series.anchor_date());
            if let Some(end) = series.end_repeat {
                prop_assert!(occ.date <= end);
            }
            prop_assert!(series.is_occurrence_date(occ.date));
        }
    }

    /// Occurrences keep the anchor's duration and time of day.
    #[test]
    fn occurrences_preserve_duration(series in series_strategy()) {
        let dated = materialize(&Schedule::Recurring(series.clone()), &window_for(&series));
        for occ in &dated {
            prop_assert_eq!(occ.range.duration(), series.anchor.duration());
            prop_assert_eq!(occ.range.start.time(), series.anchor.start.time());
        }
    }

    /// The anchor comes first whenever it is neither excepted nor cut off.
    #[test]
    fn anchor_is_first_occurrence(series in series_strategy()) {
        let validated = validate_schedule(&Schedule::Recurring(series.clone()));
        prop_assert!(!validated.is_err_and(|e| e.contains("repeat.weekdays")));
        let dated = materialize(&Schedule::Recurring(series.clone()), &window_for(&series));
        let anchor_date = series.anchor_date();
        let anchor_valid = !series.exceptions.contains(&anchor_date)
            && series.end_repeat.is_none_or(|end| anchor_date <= end);
        if anchor_valid {
            prop_assert_eq!(dated.first().map(|d| d.date), Some(anchor_date));
        }
    }

    #[test]
    fn overlap_is_symmetric(a in series_strategy(), b in series_strategy()) {
        let a = Schedule::Recurring(a);
        let b = Schedule::Recurring(b);
        let config = EngineConfig { lookahead_days: 90, ..EngineConfig::default() };
        prop_assert_eq!(overlaps(&a, &b, &config), overlaps(&b, &a, &config));
    }

    /// Moving to DST and back restores the stored record exactly, duty
    /// override included.
    #[test]
    fn dst_round_trip(series in series_strategy(), on in any::<bool>()) {
        let mut shift = Shift::new("p", Schedule::Recurring(series.clone()))
            .with_timezone("Europe/Berlin", SavingTime::Std);
        shift.duty = Some(DutyOverride { at: series.anchor.end, on });
        let there = adjust_shift(&shift, SavingTime::Dst).unwrap().unwrap();
        prop_assert_eq!(
            there.duty.map(|d| d.at),
            Some(there.schedule.anchor().end)
        );
        let back = adjust_shift(&there, SavingTime::Std).unwrap().unwrap();
        prop_assert_eq!(back, shift);
    }

    /// A DST move keeps every occurrence's identity: the same occurrences,
    /// each one hour later.
    #[test]
    fn dst_moves_every_occurrence_by_one_hour(series in series_strategy()) {
        let shift = Shift::new("p", Schedule::Recurring(series.clone()))
            .with_timezone("Europe/Berlin", SavingTime::Std);
        let moved = adjust_shift(&shift, SavingTime::Dst).unwrap().unwrap();
        let window = window_for(&series);

        let before: Vec<TimeRange> = materialize(&shift.schedule, &window)
            .into_iter()
            .map(|d| d.range.shifted(Duration::hours(1)))
            .collect();
        let after: Vec<TimeRange> = materialize(&moved.schedule, &window.shifted(Duration::hours(1)))
            .into_iter()
            .map(|d| d.range)
            .collect();
        prop_assert_eq!(before, after);
    }
}

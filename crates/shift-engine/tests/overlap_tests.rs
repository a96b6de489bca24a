//! Overlap validation between candidate schedules and stored shifts.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc, Weekday};
use shift_engine::{
    ensure_no_conflict, find_conflict, overlaps, EngineConfig, RecurrenceRule, Schedule, Series,
    Shift, ShiftError, ShiftId, TimeRange,
};

fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

fn oct(d: u32, h: u32) -> DateTime<Utc> {
    at(2021, 10, d, h, 0, 0)
}

fn single(d: u32, from: u32, to: u32) -> Schedule {
    Schedule::Single(TimeRange::new(oct(d, from), oct(d, to)))
}

fn daily_from_9th() -> Shift {
    Shift::recurring("daily", oct(9, 8), oct(9, 16), RecurrenceRule::daily(1))
}

#[test]
fn recurring_candidate_reports_first_conflicting_date() {
    let existing = Shift::single("one", oct(20, 12), oct(20, 14)).with_resource("Ward A");
    let candidate = Shift::recurring("c", oct(10, 8), oct(10, 13), RecurrenceRule::daily(1));

    let conflict =
        find_conflict(&candidate.schedule, &[existing], None, &EngineConfig::default()).unwrap();
    assert_eq!(conflict.candidate.start, oct(20, 8));
    assert_eq!(conflict.existing.start, oct(20, 12));
    assert_eq!(conflict.overlap_minutes(), 60);
    assert_eq!(conflict.resource.as_deref(), Some("Ward A"));
}

#[test]
fn first_existing_shift_in_storage_order_wins() {
    let a = Shift::single("a", oct(10, 9), oct(10, 10));
    let b = Shift::single("b", oct(10, 8), oct(10, 9));
    let candidate = single(10, 8, 12);

    let conflict =
        find_conflict(&candidate, &[a.clone(), b.clone()], None, &EngineConfig::default()).unwrap();
    assert_eq!(conflict.shift_id, ShiftId::from("a"));

    let conflict = find_conflict(&candidate, &[b, a], None, &EngineConfig::default()).unwrap();
    assert_eq!(conflict.shift_id, ShiftId::from("b"));
}

#[test]
fn excepted_and_ended_dates_do_not_conflict() {
    let excepted = daily_from_9th().with_exceptions([NaiveDate::from_ymd_opt(2021, 10, 10).unwrap()]);
    let ended = Shift::recurring("ended", oct(9, 8), oct(9, 16), RecurrenceRule::daily(1))
        .with_end_repeat(NaiveDate::from_ymd_opt(2021, 10, 9).unwrap());
    let candidate = single(10, 9, 10);

    assert!(find_conflict(&candidate, &[excepted, ended], None, &EngineConfig::default()).is_none());
}

#[test]
fn weekly_rule_only_conflicts_on_its_weekdays() {
    // 2021-10-11 is a Monday.
    let existing = Shift::recurring(
        "w",
        oct(11, 8),
        oct(11, 16),
        RecurrenceRule::weekly(1, [Weekday::Mon]),
    );
    let config = EngineConfig::default();
    assert!(find_conflict(&single(12, 9, 10), std::slice::from_ref(&existing), None, &config).is_none());
    assert!(find_conflict(&single(18, 9, 10), &[existing], None, &config).is_some());
}

#[test]
fn lookahead_bounds_the_search() {
    let far = Shift::single("far", at(2022, 11, 14, 8, 0, 0), at(2022, 11, 14, 9, 0, 0));
    let candidate = daily_from_9th().schedule;

    assert!(find_conflict(&candidate, std::slice::from_ref(&far), None, &EngineConfig::default()).is_none());

    let wide = EngineConfig {
        lookahead_days: 500,
        ..EngineConfig::default()
    };
    assert!(find_conflict(&candidate, &[far], None, &wide).is_some());
}

#[test]
fn second_resolution_sees_one_second_overlap() {
    let existing = Shift::recurring(
        "daily",
        at(2021, 10, 9, 8, 59, 0),
        at(2021, 10, 9, 9, 0, 1),
        RecurrenceRule::daily(1),
    );
    let candidate = single(10, 9, 10);
    let exact = EngineConfig {
        overlap_resolution_secs: 1,
        ..EngineConfig::default()
    };

    assert!(find_conflict(&candidate, std::slice::from_ref(&existing), None, &EngineConfig::default()).is_none());
    assert!(find_conflict(&candidate, &[existing], None, &exact).is_some());
}

#[test]
fn overlaps_is_symmetric() {
    let nightly = Schedule::Recurring(Series::new(
        TimeRange::new(oct(9, 22), oct(10, 6)),
        RecurrenceRule::daily(2),
    ));
    let morning = Shift::recurring("m", oct(12, 5), oct(12, 7), RecurrenceRule::daily(7)).schedule;
    let evening = single(15, 18, 21);
    let config = EngineConfig::default();

    assert!(overlaps(&nightly, &morning, &config));
    assert!(overlaps(&morning, &nightly, &config));
    assert!(!overlaps(&nightly, &evening, &config));
    assert!(!overlaps(&evening, &nightly, &config));
}

#[test]
fn ensure_no_conflict_returns_conflict_error() {
    let err = ensure_no_conflict(&single(10, 9, 10), &[daily_from_9th()], None, &EngineConfig::default())
        .unwrap_err();
    match err {
        ShiftError::Conflict(conflict) => {
            assert_eq!(conflict.overlap().duration(), Duration::hours(1));
            assert_eq!(
                conflict.to_string(),
                "Shift overlaps with an existing shift (2021-10-10T08:00:00+00:00 to 2021-10-10T16:00:00+00:00)"
            );
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

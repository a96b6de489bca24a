//! # shift-engine
//!
//! Deterministic recurring-shift scheduling.
//!
//! The engine turns a stored shift definition (first occurrence, optional
//! repeat rule, exception dates, end-of-repeat, timezone regime tag) into
//! concrete occurrences, detects overlaps between shifts, evaluates duty
//! status, and plans safe mutations of recurring series. It performs no I/O:
//! callers pass loaded records in and get computation results or mutation
//! plans back.
//!
//! ## Modules
//!
//! - [`rule`] — Recurrence rules (daily / weekly, interval, weekday set, RRULE interop)
//! - [`model`] — Shift records, schedules, patches
//! - [`occurrence`] — Schedule + window → ordered occurrences
//! - [`overlap`] — Conflict search over a one-year lookahead window
//! - [`duty`] — On/off duty status with manual overrides
//! - [`series`] — Delete/edit one or all-following occurrences as saga plans
//! - [`saga`] — Reference executor for plans with compensating rollback
//! - [`dst`] — Daylight-saving batch adjustment
//! - [`tz`] — Timezone lookup collaborator
//! - [`validate`] — Aggregated field validation
//! - [`config`] — Engine configuration
//! - [`error`] — Error types

pub mod config;
pub mod dst;
pub mod duty;
pub mod error;
pub mod model;
pub mod occurrence;
pub mod overlap;
pub mod rule;
pub mod saga;
pub mod series;
pub mod tz;
pub mod validate;

pub use config::EngineConfig;
pub use dst::{adjust_shift, adjust_shifts, plan_transition, saving_time_for};
pub use duty::{check_duty, duty_at, set_duty};
pub use error::{ShiftError, ValidationErrors};
pub use model::{
    DutyOverride, IdGenerator, Patch, SavingTime, Schedule, Series, Shift, ShiftId, ShiftPatch,
    TimeRange, UuidIdGenerator,
};
pub use occurrence::{
    group_by_date, materialize, next_occurrence, occurrence_at, occurrences,
    previous_occurrence_date, DatedRange, Occurrence, SeriesDates,
};
pub use overlap::{ensure_no_conflict, find_conflict, overlaps, Conflict};
pub use rule::{Frequency, RecurrenceRule};
pub use saga::{execute, InMemoryShiftStore, SagaError, SagaReport, ShiftStore, StoreError};
pub use series::{Intent, MutationPlan, SagaStep, SeriesMutator};
pub use tz::{ChronoTzLookup, TimezoneLookup};
pub use validate::{validate_schedule, validate_shift};

//! Timezone collaborator.
//!
//! The engine never consults a timezone database directly; it asks a
//! [`TimezoneLookup`] whether an IANA name is valid, whether the zone
//! observes daylight saving, and which regime is in force at an instant.
//! [`ChronoTzLookup`] answers from the `chrono-tz` compiled database.

use chrono::{DateTime, Datelike, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::ShiftError;
use crate::model::SavingTime;

pub trait TimezoneLookup {
    /// Whether `name` is a known IANA timezone.
    fn is_valid(&self, name: &str) -> bool;

    /// Whether the zone uses different offsets across `year`.
    fn observes_dst(&self, name: &str, year: i32) -> Result<bool, ShiftError>;

    /// Whether daylight saving is in force at `instant`.
    fn dst_active(&self, name: &str, instant: DateTime<Utc>) -> Result<bool, ShiftError>;

    /// The regime tag a shift in `name` should carry at `instant`.
    fn saving_time_at(&self, name: &str, instant: DateTime<Utc>) -> Result<SavingTime, ShiftError> {
        if !self.observes_dst(name, instant.year())? {
            return Ok(SavingTime::None);
        }
        if self.dst_active(name, instant)? {
            Ok(SavingTime::Dst)
        } else {
            Ok(SavingTime::Std)
        }
    }
}

/// [`TimezoneLookup`] backed by `chrono-tz`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChronoTzLookup;

impl TimezoneLookup for ChronoTzLookup {
    fn is_valid(&self, name: &str) -> bool {
        parse_timezone(name).is_ok()
    }

    fn observes_dst(&self, name: &str, year: i32) -> Result<bool, ShiftError> {
        let tz = parse_timezone(name)?;
        let (winter, summer) = solstice_offsets(&tz, year);
        Ok(winter != summer)
    }

    fn dst_active(&self, name: &str, instant: DateTime<Utc>) -> Result<bool, ShiftError> {
        let tz = parse_timezone(name)?;
        Ok(is_dst_active(&instant, &tz))
    }
}

/// Parse an IANA timezone string into `Tz`.
pub fn parse_timezone(s: &str) -> Result<Tz, ShiftError> {
    s.parse::<Tz>()
        .map_err(|_| ShiftError::InvalidTimezone(format!("'{}'", s)))
}

/// Offsets (seconds east of UTC) in effect mid-January and mid-July.
fn solstice_offsets(tz: &Tz, year: i32) -> (i32, i32) {
    let offset_on = |month: u32| {
        Utc.with_ymd_and_hms(year, month, 15, 12, 0, 0)
            .single()
            .map(|dt| dt.with_timezone(tz).offset().fix().local_minus_utc())
            .unwrap_or(0)
    };
    (offset_on(1), offset_on(7))
}

/// Determine if DST is active for an instant in a timezone.
///
/// The standard offset is the smaller of the January and July offsets, which
/// holds for both hemispheres: daylight saving only ever adds time.
fn is_dst_active(instant: &DateTime<Utc>, tz: &Tz) -> bool {
    let (winter, summer) = solstice_offsets(tz, instant.year());
    let standard = winter.min(summer);
    let current = instant.with_timezone(tz).offset().fix().local_minus_utc();
    current != standard
}

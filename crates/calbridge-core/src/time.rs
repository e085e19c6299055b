//! Timezone conversion chain for provider event times.
//!
//! Providers report event times in a handful of shapes: RFC 3339 with an
//! offset, wall-clock times that belong to the calendar's zone, iCalendar
//! basic format, or plain dates. [`ProviderTime`] captures which one we got
//! so the value can be re-rendered in the caller's zone as
//! [`LOCAL_FORMAT`] (no trailing offset).

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, SecondsFormat, TimeDelta, TimeZone,
    Utc,
};
use chrono_tz::Tz;
use thiserror::Error;

/// Rendering used for every normalized event time.
pub const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("unrecognized time value: {0}")]
    Unrecognized(String),

    #[error("unknown time zone: {0}")]
    UnknownZone(String),

    #[error("local time {time} does not exist in {zone}")]
    Nonexistent { time: String, zone: String },
}

/// Parses an IANA zone name such as `Europe/Paris`.
pub fn parse_zone(name: &str) -> Result<Tz, TimeError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| TimeError::UnknownZone(name.to_string()))
}

/// Renders an instant as RFC 3339 in the given zone, e.g. for query bounds.
pub fn rfc3339_in(instant: DateTime<Utc>, zone: Tz) -> String {
    instant
        .with_timezone(&zone)
        .to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// A time value as reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderTime {
    /// An absolute instant carrying its own offset.
    Zoned(DateTime<FixedOffset>),
    /// Wall-clock time in the calendar's zone.
    Floating(NaiveDateTime),
    /// An all-day date.
    Date(NaiveDate),
}

impl ProviderTime {
    pub fn parse(value: &str) -> Result<Self, TimeError> {
        let value = value.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(Self::Zoned(dt));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ") {
            return Ok(Self::Zoned(naive.and_utc().fixed_offset()));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y%m%dT%H%M%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(Self::Floating(naive));
            }
        }
        for format in [DATE_FORMAT, "%Y%m%d"] {
            if let Ok(date) = NaiveDate::parse_from_str(value, format) {
                return Ok(Self::Date(date));
            }
        }

        Err(TimeError::Unrecognized(value.to_string()))
    }

    /// Renders the value in `target`, reading floating times as `source` wall-clock.
    ///
    /// Dates are not shifted. An ambiguous wall-clock time (DST fold) resolves
    /// to the earlier instant. A time inside a DST gap is read with the offset
    /// in effect before the gap, which moves it forward by the gap's length.
    pub fn to_local(&self, source: Tz, target: Tz) -> Result<String, TimeError> {
        let instant = match *self {
            Self::Zoned(dt) => dt.with_timezone(&target),
            Self::Floating(naive) => match source.from_local_datetime(&naive).earliest() {
                Some(dt) => dt.with_timezone(&target),
                None => across_gap(naive, source)?.with_timezone(&target),
            },
            Self::Date(date) => return Ok(date.format(DATE_FORMAT).to_string()),
        };
        Ok(instant.format(LOCAL_FORMAT).to_string())
    }
}

/// Resolves a wall-clock time that falls in a DST gap of `zone`.
fn across_gap(naive: NaiveDateTime, zone: Tz) -> Result<DateTime<Utc>, TimeError> {
    let before = zone
        .offset_from_local_datetime(&(naive - TimeDelta::days(1)))
        .earliest()
        .ok_or_else(|| TimeError::Nonexistent {
            time: naive.format(LOCAL_FORMAT).to_string(),
            zone: zone.name().to_string(),
        })?;
    let utc = naive - TimeDelta::seconds(i64::from(before.fix().local_minus_utc()));
    Ok(utc.and_utc())
}

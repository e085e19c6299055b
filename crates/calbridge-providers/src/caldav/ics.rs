//! iCalendar (RFC 5545) conversion for CalDAV resources.

use calbridge_core::{EventDraft, ProviderTime, parse_zone};
use chrono::{TimeZone, Utc};
use icalendar::{
    Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, Event, EventLike,
    EventStatus,
};

use crate::error::{ProviderError, ProviderResult};

/// A property time as written in the resource, with its TZID parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcsTime {
    /// `20240315T100000`, `20240315T100000Z` or `20240315`.
    pub raw: String,
    pub tzid: Option<String>,
}

/// The fields of the first VEVENT in a calendar resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IcsEvent {
    pub uid: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<IcsTime>,
    pub end: Option<IcsTime>,
    pub cancelled: bool,
}

/// Parses the first VEVENT out of a VCALENDAR document.
///
/// Returns `Ok(None)` when the resource holds no event (e.g. only a VTODO).
pub fn parse_event(ics: &str) -> ProviderResult<Option<IcsEvent>> {
    let calendar = ics
        .parse::<Calendar>()
        .map_err(|e| ProviderError::invalid_response(format!("unparseable calendar data: {e}")))?;

    let Some(event) = calendar.iter().find_map(|component| match component {
        CalendarComponent::Event(event) => Some(event),
        _ => None,
    }) else {
        return Ok(None);
    };

    Ok(Some(IcsEvent {
        uid: event.get_uid().map(str::to_string),
        summary: event.get_summary().map(str::to_string),
        description: event.get_description().map(str::to_string),
        start: event.get_start().map(ics_time),
        end: event.get_end().map(ics_time),
        cancelled: matches!(event.get_status(), Some(EventStatus::Cancelled)),
    }))
}

fn ics_time(value: DatePerhapsTime) -> IcsTime {
    match value {
        DatePerhapsTime::Date(date) => IcsTime {
            raw: date.format("%Y%m%d").to_string(),
            tzid: None,
        },
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => IcsTime {
            raw: dt.format("%Y%m%dT%H%M%SZ").to_string(),
            tzid: None,
        },
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => IcsTime {
            raw: naive.format("%Y%m%dT%H%M%S").to_string(),
            tzid: None,
        },
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => IcsTime {
            raw: date_time.format("%Y%m%dT%H%M%S").to_string(),
            tzid: Some(tzid),
        },
    }
}

/// Returns the TZID of the first VTIMEZONE in a `calendar-timezone` value.
pub fn timezone_id(vcalendar: &str) -> Option<String> {
    let mut in_timezone = false;
    for line in vcalendar.lines().map(str::trim) {
        match line {
            "BEGIN:VTIMEZONE" => in_timezone = true,
            "END:VTIMEZONE" => in_timezone = false,
            _ if in_timezone => {
                if let Some(id) = line.strip_prefix("TZID:") {
                    return Some(id.to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn draft_time(value: &str, zone: Option<&str>) -> ProviderResult<DatePerhapsTime> {
    let time = ProviderTime::parse(value).map_err(|e| ProviderError::bad_request(e.to_string()))?;
    Ok(match time {
        ProviderTime::Date(date) => DatePerhapsTime::Date(date),
        ProviderTime::Zoned(dt) => CalendarDateTime::Utc(dt.with_timezone(&Utc)).into(),
        ProviderTime::Floating(naive) => match zone {
            Some(tzid) => CalendarDateTime::WithTimezone {
                date_time: naive,
                tzid: tzid.to_string(),
            }
            .into(),
            None => CalendarDateTime::Utc(Utc.from_utc_datetime(&naive)).into(),
        },
    })
}

/// Renders a draft as a single-event VCALENDAR.
///
/// Wall-clock times carry the draft's zone as TZID; without one they are
/// written as UTC.
pub fn build_event(uid: &str, draft: &EventDraft) -> ProviderResult<String> {
    if let Some(zone) = draft.time_zone.as_deref() {
        parse_zone(zone).map_err(|e| ProviderError::bad_request(e.to_string()))?;
    }
    let zone = draft.time_zone.as_deref();

    let mut event = Event::new();
    event
        .uid(uid)
        .summary(&draft.summary)
        .starts(draft_time(&draft.start_time, zone)?)
        .ends(draft_time(&draft.end_time, zone)?);
    if !draft.description.is_empty() {
        event.description(&draft.description);
    }

    let mut calendar = Calendar::new();
    calendar.push(event.done());
    Ok(calendar.to_string())
}

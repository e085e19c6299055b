//! Provider value normalization applied at the adapter boundary.
//!
//! Event times and cursors arrive in provider-specific shapes; adapters run
//! them through these helpers before anything reaches the reconciler.

use calbridge_core::{ProviderTime, parse_zone};
use chrono_tz::Tz;

use crate::adapter::SyncSession;
use crate::error::ProviderResult;

/// Renders an ISO-8601 provider time for the caller.
///
/// Without a requested local zone the provider string passes through
/// untouched. Otherwise it is read in `zone_hint` (or the calendar's zone,
/// or UTC) and converted.
pub fn render_time(
    raw: &str,
    zone_hint: Option<Tz>,
    session: &SyncSession,
) -> ProviderResult<String> {
    match session.local_zone {
        None => Ok(raw.to_string()),
        Some(local) => {
            let source = zone_hint.or(session.source_zone).unwrap_or(chrono_tz::UTC);
            Ok(ProviderTime::parse(raw)?.to_local(source, local)?)
        }
    }
}

/// Renders an iCalendar property time (`20240315T100000`, `...Z`, `20240315`).
///
/// These are always reformatted; without a local zone the value stays in
/// its own zone.
pub fn render_ical_time(
    raw: &str,
    zone_hint: Option<Tz>,
    session: &SyncSession,
) -> ProviderResult<String> {
    let source = zone_hint.or(session.source_zone).unwrap_or(chrono_tz::UTC);
    let target = session.local_zone.unwrap_or(source);
    Ok(ProviderTime::parse(raw)?.to_local(source, target)?)
}

/// Looks up a provider zone name, ignoring names chrono-tz does not know
/// (Windows zone names, custom VTIMEZONE ids).
pub fn known_zone(name: Option<&str>) -> Option<Tz> {
    name.and_then(|n| parse_zone(n).ok())
}

/// Strips the `=ok` marker some client libraries append to sync tokens.
pub fn clean_cursor(token: &str) -> &str {
    token.strip_suffix("=ok").unwrap_or(token)
}

//! Normalized calendar and event shapes.

use serde::{Deserialize, Serialize};

use crate::sync::SyncCursor;

/// A provider calendar: opaque id (a collection URL for CalDAV) plus the
/// cursor from which incremental sync starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarRef {
    pub id: String,
    pub sync_token: SyncCursor,
}

/// The provider-agnostic fields of an event.
///
/// Times are already rendered for the caller: either passed through as the
/// provider reported them or converted to the requested local zone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventProperties {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub description: String,
}

/// An event as reported by sync, with its concurrency tag (ETag / change key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub properties: EventProperties,
    pub concurrency_tag: String,
}

impl EventRecord {
    pub fn id(&self) -> &str {
        &self.properties.id
    }
}

/// Input for creating or replacing an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub summary: String,
    /// ISO-8601 wall-clock or offset time.
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub description: String,
    /// IANA zone for wall-clock times; UTC when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDraft {
    pub fn new(
        summary: impl Into<String>,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
    ) -> Self {
        Self {
            summary: summary.into(),
            start_time: start_time.into(),
            end_time: end_time.into(),
            description: String::new(),
            time_zone: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_time_zone(mut self, zone: impl Into<String>) -> Self {
        self.time_zone = Some(zone.into());
        self
    }
}

/// Identity of a stored event after a write: id plus its fresh tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRef {
    pub id: String,
    pub concurrency_tag: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_record_wire_shape() {
        let record = EventRecord {
            properties: EventProperties {
                id: "evt1".into(),
                summary: "Standup".into(),
                start_time: "2024-03-15T10:00:00".into(),
                end_time: "2024-03-15T10:15:00".into(),
                description: String::new(),
            },
            concurrency_tag: "\"3181161\"".into(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["properties"]["startTime"], "2024-03-15T10:00:00");
        assert_eq!(json["properties"]["endTime"], "2024-03-15T10:15:00");
        assert_eq!(json["concurrencyTag"], "\"3181161\"");
        assert_eq!(record.id(), "evt1");
    }

    #[test]
    fn test_draft_builder() {
        let draft = EventDraft::new("Review", "2024-03-15T10:00:00", "2024-03-15T11:00:00")
            .with_description("quarterly")
            .with_time_zone("Europe/Paris");
        assert_eq!(draft.description, "quarterly");
        assert_eq!(draft.time_zone.as_deref(), Some("Europe/Paris"));
    }

    #[test]
    fn test_draft_deserializes_without_optional_fields() {
        let draft: EventDraft = serde_json::from_str(
            r#"{"summary":"a","startTime":"2024-01-01T00:00:00","endTime":"2024-01-01T01:00:00"}"#,
        )
        .unwrap();
        assert!(draft.description.is_empty());
        assert!(draft.time_zone.is_none());
    }
}

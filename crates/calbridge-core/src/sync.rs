//! Sync cursors and change accumulation.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::EventRecord;

/// Opaque provider sync position.
///
/// Only the adapter that issued a cursor knows its shape (a Google sync
/// token, a Graph delta token, a CalDAV sync-token URI). Everything else
/// stores and forwards it verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCursor(String);

impl SyncCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SyncCursor {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SyncCursor {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Everything that changed since the caller's cursor, fully drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub updated_events: Vec<EventRecord>,
    pub deleted_event_ids: Vec<String>,
    pub new_cursor: SyncCursor,
}

/// Accumulates classified changes across pages.
///
/// An id is either updated or deleted in the final result, never both: the
/// last report for an id wins. Updates keep the position of their latest
/// report; deleted ids are de-duplicated.
#[derive(Debug, Default)]
pub struct ChangeSet {
    updates: Vec<Option<EventRecord>>,
    update_index: HashMap<String, usize>,
    deletes: Vec<Option<String>>,
    delete_index: HashMap<String, usize>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_update(&mut self, record: EventRecord) {
        let id = record.id().to_string();
        if let Some(slot) = self.delete_index.remove(&id) {
            self.deletes[slot] = None;
        }
        if let Some(slot) = self.update_index.remove(&id) {
            self.updates[slot] = None;
        }
        self.update_index.insert(id, self.updates.len());
        self.updates.push(Some(record));
    }

    pub fn record_removal(&mut self, id: impl Into<String>) {
        let id = id.into();
        if let Some(slot) = self.update_index.remove(&id) {
            self.updates[slot] = None;
        }
        if !self.delete_index.contains_key(&id) {
            self.delete_index.insert(id.clone(), self.deletes.len());
            self.deletes.push(Some(id));
        }
    }

    pub fn update_count(&self) -> usize {
        self.update_index.len()
    }

    pub fn removal_count(&self) -> usize {
        self.delete_index.len()
    }

    pub fn finish(self, new_cursor: SyncCursor) -> SyncResult {
        SyncResult {
            updated_events: self.updates.into_iter().flatten().collect(),
            deleted_event_ids: self.deletes.into_iter().flatten().collect(),
            new_cursor,
        }
    }
}

//! Domain events emitted by the queue engine for downstream collaborators

use crate::domain::entry::QueueEntry;
use crate::domain::types::{EntryId, EntryStatus};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A customer checked in
    EntryAdded { entry: QueueEntry, queue_position: usize, estimated_wait_minutes: u32 },
    /// An entry's status changed value
    StatusChanged { entry_id: EntryId, old_status: EntryStatus, new_status: EntryStatus },
    /// An entry was deleted from the queue
    EntryRemoved { entry_id: EntryId },
}

impl QueueEvent {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueEvent::EntryAdded { .. } => "entry_added",
            QueueEvent::StatusChanged { .. } => "status_changed",
            QueueEvent::EntryRemoved { .. } => "entry_removed",
        }
    }

    pub fn entry_id(&self) -> EntryId {
        match self {
            QueueEvent::EntryAdded { entry, .. } => entry.id,
            QueueEvent::StatusChanged { entry_id, .. } => *entry_id,
            QueueEvent::EntryRemoved { entry_id } => *entry_id,
        }
    }

    /// Serialize to a single-line JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

//! Queue entry data model and the service history derived from it

use crate::domain::types::{EntryId, EntryStatus, ServiceType};
use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

/// Elapsed minutes between two timestamps, never negative
#[inline]
pub fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let ms = (to - from).num_milliseconds().max(0);
    ms as f64 / 60_000.0
}

/// Validated fields for an entry that has not been stored yet
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub name: String,
    pub phone: Option<String>,
    pub party_size: u32,
    pub service_type: ServiceType,
    pub location: String,
}

/// One customer's queue record from check-in to terminal status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub party_size: u32,
    pub service_type: ServiceType,
    pub location: String,
    pub status: EntryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_wait_minutes: u32,
}

impl QueueEntry {
    /// Create a waiting entry from a validated draft
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::Utc;
    /// use venue_queue::domain::entry::{NewEntry, QueueEntry};
    /// use venue_queue::domain::types::{EntryId, EntryStatus, ServiceType};
    ///
    /// let draft = NewEntry {
    ///     name: "Ada".to_string(),
    ///     phone: None,
    ///     party_size: 2,
    ///     service_type: ServiceType::DineIn,
    ///     location: "Main Dining".to_string(),
    /// };
    /// let entry = QueueEntry::new(EntryId(1), draft, Utc::now(), 15);
    /// assert_eq!(entry.status, EntryStatus::Waiting);
    /// assert!(entry.completed_at.is_none());
    /// ```
    pub fn new(id: EntryId, draft: NewEntry, created_at: DateTime<Utc>, estimated_wait_minutes: u32) -> Self {
        Self {
            id,
            name: draft.name,
            phone: draft.phone,
            party_size: draft.party_size,
            service_type: draft.service_type,
            location: draft.location,
            status: EntryStatus::Waiting,
            notes: None,
            created_at,
            updated_at: None,
            completed_at: None,
            estimated_wait_minutes,
        }
    }

    #[inline]
    pub fn is_waiting(&self) -> bool {
        self.status == EntryStatus::Waiting
    }

    /// Hour of day (UTC) the entry was created in
    #[inline]
    pub fn created_hour(&self) -> u32 {
        self.created_at.hour()
    }

    /// Minutes spent in the queue as of `now`
    #[inline]
    pub fn current_wait_minutes(&self, now: DateTime<Utc>) -> f64 {
        minutes_between(self.created_at, now)
    }

    /// Apply a status change. Caller is responsible for validating the
    /// transition; this keeps `completed_at` in step with the status.
    pub(crate) fn apply_status(&mut self, status: EntryStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = Some(now);
        if status.is_terminal() && self.completed_at.is_none() {
            // Clock skew between callers must not produce a negative wait
            self.completed_at = Some(now.max(self.created_at));
        }
    }

    /// Total wait in minutes for a completed entry
    pub fn actual_wait_minutes(&self) -> Option<f64> {
        self.completed_at.map(|done| minutes_between(self.created_at, done))
    }
}

/// Immutable record appended when an entry reaches a terminal status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHistoryRecord {
    pub entry_id: EntryId,
    pub party_size: u32,
    pub service_type: ServiceType,
    pub service_code: u8,
    pub hour_of_day: u32,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub actual_wait_minutes: f64,
    pub status: EntryStatus,
}

impl ServiceHistoryRecord {
    /// Build the history record for a terminal entry. Returns `None` if the
    /// entry has not completed.
    pub fn from_completed(entry: &QueueEntry) -> Option<Self> {
        let completed_at = entry.completed_at?;
        if !entry.status.is_terminal() {
            return None;
        }
        Some(Self {
            entry_id: entry.id,
            party_size: entry.party_size,
            service_type: entry.service_type,
            service_code: entry.service_type.feature_code(),
            hour_of_day: entry.created_hour(),
            created_at: entry.created_at,
            completed_at,
            actual_wait_minutes: minutes_between(entry.created_at, completed_at),
            status: entry.status,
        })
    }
}

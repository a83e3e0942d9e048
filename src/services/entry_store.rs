//! Entry store - the single source of truth for queue entries
//!
//! All state lives behind one `RwLock`: mutations take the write lock for the
//! whole change (status, timestamps and history append happen together), and
//! readers get cloned snapshots so no caller can observe or mutate a
//! half-applied change.

use crate::domain::entry::{NewEntry, QueueEntry, ServiceHistoryRecord};
use crate::domain::error::{QueueError, QueueResult};
use crate::domain::types::{EntryId, EntryStatus};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

/// Result of creating an entry
#[derive(Debug, Clone)]
pub struct CreatedEntry {
    pub entry: QueueEntry,
    /// 1-based rank among waiting entries by creation time
    pub queue_position: usize,
}

/// Result of a successful status update
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub entry: QueueEntry,
    pub previous: EntryStatus,
}

impl StatusUpdate {
    #[inline]
    pub fn changed(&self) -> bool {
        self.previous != self.entry.status
    }
}

/// Consistent point-in-time copy of the store
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// All entries ordered by `(created_at, id)`
    pub entries: Vec<QueueEntry>,
    /// Append-only history, oldest first
    pub history: Vec<ServiceHistoryRecord>,
}

impl StoreSnapshot {
    /// Waiting entries in creation order
    pub fn waiting(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter().filter(|e| e.is_waiting())
    }

    pub fn with_status(&self, status: EntryStatus) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter().filter(move |e| e.status == status)
    }
}

struct StoreState {
    entries: BTreeMap<EntryId, QueueEntry>,
    history: Vec<ServiceHistoryRecord>,
    next_id: u64,
}

impl StoreState {
    fn ordered(&self, filter: Option<EntryStatus>) -> Vec<QueueEntry> {
        let mut entries: Vec<QueueEntry> = self
            .entries
            .values()
            .filter(|e| filter.map_or(true, |status| e.status == status))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        entries
    }

    /// 1-based position of a waiting entry among all waiting entries
    fn waiting_position(&self, entry: &QueueEntry) -> Option<usize> {
        if !entry.is_waiting() {
            return None;
        }
        let ahead = self
            .entries
            .values()
            .filter(|e| e.is_waiting())
            .filter(|e| (e.created_at, e.id) < (entry.created_at, entry.id))
            .count();
        Some(ahead + 1)
    }
}

/// Authoritative store of queue entries and their service history
pub struct EntryStore {
    state: RwLock<StoreState>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                entries: BTreeMap::new(),
                history: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Store a new waiting entry without a queue cap.
    ///
    /// `initial_estimate` receives the waiting count including the new entry
    /// and runs under the write lock, so the entry is never visible without
    /// an estimate.
    #[cfg(test)]
    pub fn create<F>(&self, draft: NewEntry, now: DateTime<Utc>, initial_estimate: F) -> CreatedEntry
    where
        F: FnOnce(usize) -> u32,
    {
        let mut state = self.state.write();
        let waiting_count = state.entries.values().filter(|e| e.is_waiting()).count() + 1;
        Self::insert(&mut state, draft, now, waiting_count, initial_estimate)
    }

    /// Store a new waiting entry, or fail with a validation error instead of
    /// growing the waiting queue past `max_waiting`.
    ///
    /// The check and the insert happen under the same write lock.
    /// `initial_estimate` receives the waiting count including the new entry.
    pub fn try_create<F>(
        &self,
        draft: NewEntry,
        now: DateTime<Utc>,
        max_waiting: usize,
        initial_estimate: F,
    ) -> QueueResult<CreatedEntry>
    where
        F: FnOnce(usize) -> u32,
    {
        let mut state = self.state.write();
        let waiting = state.entries.values().filter(|e| e.is_waiting()).count();
        if waiting >= max_waiting {
            return Err(QueueError::validation(format!("queue is full ({waiting} waiting)")));
        }
        Ok(Self::insert(&mut state, draft, now, waiting + 1, initial_estimate))
    }

    fn insert<F>(
        state: &mut StoreState,
        draft: NewEntry,
        now: DateTime<Utc>,
        waiting_count: usize,
        initial_estimate: F,
    ) -> CreatedEntry
    where
        F: FnOnce(usize) -> u32,
    {
        let id = EntryId(state.next_id);
        state.next_id += 1;

        let estimate = initial_estimate(waiting_count);
        let entry = QueueEntry::new(id, draft, now, estimate);
        let queue_position = state.waiting_position(&entry).unwrap_or(waiting_count);

        state.entries.insert(id, entry.clone());
        debug!(entry_id = %id, waiting = %waiting_count, "entry_stored");

        CreatedEntry { entry, queue_position }
    }

    pub fn get(&self, id: EntryId) -> QueueResult<QueueEntry> {
        self.state.read().entries.get(&id).cloned().ok_or(QueueError::NotFound(id))
    }

    /// Entry plus its current waiting position (None unless waiting)
    pub fn get_with_position(&self, id: EntryId) -> QueueResult<(QueueEntry, Option<usize>)> {
        let state = self.state.read();
        let entry = state.entries.get(&id).ok_or(QueueError::NotFound(id))?;
        Ok((entry.clone(), state.waiting_position(entry)))
    }

    /// Entries ordered by creation time, optionally filtered by status
    pub fn list(&self, status_filter: Option<EntryStatus>) -> Vec<QueueEntry> {
        self.state.read().ordered(status_filter)
    }

    /// Move an entry to a new status.
    ///
    /// Terminal statuses are final: any update of a terminal entry fails with
    /// `InvalidTransition` and leaves it untouched. Entering a terminal status
    /// stamps `completed_at` and appends a history record atomically.
    pub fn update_status(
        &self,
        id: EntryId,
        new_status: EntryStatus,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> QueueResult<StatusUpdate> {
        let mut state = self.state.write();
        let entry = state.entries.get_mut(&id).ok_or(QueueError::NotFound(id))?;

        let previous = entry.status;
        if !previous.can_transition_to(new_status) {
            return Err(QueueError::InvalidTransition { id, from: previous, to: new_status });
        }

        entry.apply_status(new_status, now);
        if notes.is_some() {
            entry.notes = notes;
        }
        let updated = entry.clone();

        if new_status.is_terminal() {
            if let Some(record) = ServiceHistoryRecord::from_completed(&updated) {
                debug!(
                    entry_id = %id,
                    status = %new_status,
                    wait_minutes = format!("{:.1}", record.actual_wait_minutes),
                    "history_appended"
                );
                state.history.push(record);
            }
        }

        Ok(StatusUpdate { entry: updated, previous })
    }

    /// Attach a refined wait estimate to an entry
    pub fn set_estimate(&self, id: EntryId, minutes: u32) -> QueueResult<QueueEntry> {
        let mut state = self.state.write();
        let entry = state.entries.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        entry.estimated_wait_minutes = minutes;
        Ok(entry.clone())
    }

    /// Recompute the stored estimate of every waiting entry at or behind
    /// `from_position`.
    ///
    /// `estimate` receives each entry with its 1-based waiting position and
    /// runs under the write lock, so positions cannot shift mid-pass. Returns
    /// how many estimates changed.
    pub fn refresh_estimates<F>(&self, from_position: usize, mut estimate: F) -> usize
    where
        F: FnMut(&QueueEntry, usize) -> u32,
    {
        let mut state = self.state.write();
        let mut waiting: Vec<(DateTime<Utc>, EntryId)> = state
            .entries
            .values()
            .filter(|e| e.is_waiting())
            .map(|e| (e.created_at, e.id))
            .collect();
        waiting.sort();

        let mut changed = 0;
        for (index, (_, id)) in waiting.into_iter().enumerate() {
            let position = index + 1;
            if position < from_position {
                continue;
            }
            if let Some(entry) = state.entries.get_mut(&id) {
                let minutes = estimate(entry, position);
                if entry.estimated_wait_minutes != minutes {
                    entry.estimated_wait_minutes = minutes;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Delete an entry. History already recorded for it is kept.
    pub fn remove(&self, id: EntryId) -> QueueResult<QueueEntry> {
        self.state.write().entries.remove(&id).ok_or(QueueError::NotFound(id))
    }

    /// Clone entries and history under a single read lock
    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read();
        StoreSnapshot { entries: state.ordered(None), history: state.history.clone() }
    }

    /// Most recent `n` history records, oldest first
    pub fn history_window(&self, n: usize) -> Vec<ServiceHistoryRecord> {
        let state = self.state.read();
        let start = state.history.len().saturating_sub(n);
        state.history[start..].to_vec()
    }

    pub fn history_len(&self) -> usize {
        self.state.read().history.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.state.read().entries.values().filter(|e| e.is_waiting()).count()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ServiceType;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn draft(party_size: u32) -> NewEntry {
        NewEntry {
            name: "Guest".to_string(),
            phone: None,
            party_size,
            service_type: ServiceType::DineIn,
            location: "Main Dining".to_string(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 2, 12, 0, 0).unwrap()
    }

    fn heuristic(count: usize) -> u32 {
        15 * count as u32
    }

    #[test]
    fn test_create_assigns_monotonic_ids_and_positions() {
        let store = EntryStore::new();

        let a = store.create(draft(2), t0(), heuristic);
        let b = store.create(draft(4), t0() + Duration::minutes(1), heuristic);

        assert_eq!(a.entry.id, EntryId(1));
        assert_eq!(b.entry.id, EntryId(2));
        assert_eq!(a.queue_position, 1);
        assert_eq!(b.queue_position, 2);
        assert_eq!(a.entry.estimated_wait_minutes, 15);
        assert_eq!(b.entry.estimated_wait_minutes, 30);
    }

    #[test]
    fn test_try_create_respects_max_waiting() {
        let store = EntryStore::new();
        let first = store.try_create(draft(2), t0(), 2, heuristic).unwrap();
        store.try_create(draft(2), t0(), 2, heuristic).unwrap();

        let full = store.try_create(draft(2), t0(), 2, heuristic);
        assert!(matches!(full, Err(QueueError::Validation { .. })));
        assert_eq!(store.len(), 2);

        // Seating someone frees a waiting slot
        store.update_status(first.entry.id, EntryStatus::Seated, None, t0()).unwrap();
        let third = store.try_create(draft(2), t0(), 2, heuristic).unwrap();
        assert_eq!(third.entry.id, EntryId(3));
        assert_eq!(third.queue_position, 2);
    }

    #[test]
    fn test_refresh_estimates_follows_positions() {
        let store = EntryStore::new();
        let ids: Vec<EntryId> =
            (0..4).map(|i| store.create(draft(2), t0() + Duration::minutes(i), heuristic).entry.id).collect();
        store.update_status(ids[0], EntryStatus::Served, None, t0() + Duration::minutes(20)).unwrap();
        store.remove(ids[1]).unwrap();

        let changed = store.refresh_estimates(1, |_, position| heuristic(position));
        assert_eq!(changed, 2);
        assert_eq!(store.get(ids[2]).unwrap().estimated_wait_minutes, 15);
        assert_eq!(store.get(ids[3]).unwrap().estimated_wait_minutes, 30);
        // Terminal entries keep the estimate they finished with
        assert_eq!(store.get(ids[0]).unwrap().estimated_wait_minutes, 15);
    }

    #[test]
    fn test_refresh_estimates_skips_positions_ahead() {
        let store = EntryStore::new();
        let a = store.create(draft(2), t0(), heuristic).entry.id;
        let b = store.create(draft(2), t0() + Duration::minutes(1), heuristic).entry.id;

        let mut seen = Vec::new();
        store.refresh_estimates(2, |entry, position| {
            seen.push((entry.id, position));
            99
        });
        assert_eq!(seen, vec![(b, 2)]);
        assert_eq!(store.get(a).unwrap().estimated_wait_minutes, 15);
        assert_eq!(store.get(b).unwrap().estimated_wait_minutes, 99);
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let store = EntryStore::new();
        assert_eq!(store.get(EntryId(42)), Err(QueueError::NotFound(EntryId(42))));
    }

    #[test]
    fn test_list_orders_by_created_at() {
        let store = EntryStore::new();
        store.create(draft(2), t0() + Duration::minutes(10), heuristic);
        store.create(draft(2), t0(), heuristic);
        store.create(draft(2), t0() + Duration::minutes(5), heuristic);

        let ids: Vec<u64> = store.list(None).iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_list_with_status_filter() {
        let store = EntryStore::new();
        let a = store.create(draft(2), t0(), heuristic);
        store.create(draft(2), t0(), heuristic);
        store.update_status(a.entry.id, EntryStatus::Seated, None, t0()).unwrap();

        assert_eq!(store.list(Some(EntryStatus::Seated)).len(), 1);
        assert_eq!(store.list(Some(EntryStatus::Waiting)).len(), 1);
        assert_eq!(store.waiting_count(), 1);
    }

    #[test]
    fn test_terminal_update_appends_history() {
        let store = EntryStore::new();
        let created = store.create(draft(3), t0(), heuristic);

        let update = store
            .update_status(
                created.entry.id,
                EntryStatus::Served,
                Some("window table".to_string()),
                t0() + Duration::minutes(25),
            )
            .unwrap();

        assert!(update.changed());
        assert_eq!(update.previous, EntryStatus::Waiting);
        assert_eq!(update.entry.completed_at, Some(t0() + Duration::minutes(25)));
        assert_eq!(update.entry.notes.as_deref(), Some("window table"));
        assert_eq!(store.history_len(), 1);
        assert_eq!(store.history_window(50)[0].actual_wait_minutes, 25.0);
    }

    #[test]
    fn test_terminal_entry_rejects_further_updates() {
        let store = EntryStore::new();
        let id = store.create(draft(2), t0(), heuristic).entry.id;
        store.update_status(id, EntryStatus::NoShow, None, t0() + Duration::minutes(5)).unwrap();

        for next in [EntryStatus::Waiting, EntryStatus::Served, EntryStatus::NoShow] {
            let err = store.update_status(id, next, None, t0() + Duration::minutes(9)).unwrap_err();
            assert_eq!(
                err,
                QueueError::InvalidTransition { id, from: EntryStatus::NoShow, to: next }
            );
        }

        let entry = store.get(id).unwrap();
        assert_eq!(entry.status, EntryStatus::NoShow);
        assert_eq!(entry.completed_at, Some(t0() + Duration::minutes(5)));
        assert_eq!(store.history_len(), 1);
    }

    #[test]
    fn test_seated_cannot_return_to_waiting() {
        let store = EntryStore::new();
        let id = store.create(draft(2), t0(), heuristic).entry.id;
        store.update_status(id, EntryStatus::Seated, None, t0()).unwrap();

        let result = store.update_status(id, EntryStatus::Waiting, None, t0());
        assert!(matches!(result, Err(QueueError::InvalidTransition { .. })));

        let served = store.update_status(id, EntryStatus::Served, None, t0() + Duration::minutes(40));
        assert!(served.is_ok());
    }

    #[test]
    fn test_same_status_update_is_not_a_change() {
        let store = EntryStore::new();
        let id = store.create(draft(2), t0(), heuristic).entry.id;

        let update = store.update_status(id, EntryStatus::Waiting, Some("late".to_string()), t0()).unwrap();
        assert!(!update.changed());
        assert_eq!(update.entry.notes.as_deref(), Some("late"));
    }

    #[test]
    fn test_position_skips_non_waiting() {
        let store = EntryStore::new();
        let a = store.create(draft(2), t0(), heuristic).entry.id;
        let b = store.create(draft(2), t0() + Duration::minutes(1), heuristic).entry.id;
        store.update_status(a, EntryStatus::Seated, None, t0()).unwrap();

        assert_eq!(store.get_with_position(b).unwrap().1, Some(1));
        assert_eq!(store.get_with_position(a).unwrap().1, None);
    }

    #[test]
    fn test_remove_keeps_history() {
        let store = EntryStore::new();
        let id = store.create(draft(2), t0(), heuristic).entry.id;
        store.update_status(id, EntryStatus::Served, None, t0() + Duration::minutes(10)).unwrap();

        store.remove(id).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.history_len(), 1);
        assert_eq!(store.remove(id), Err(QueueError::NotFound(id)));
    }

    #[test]
    fn test_history_window_keeps_most_recent() {
        let store = EntryStore::new();
        for i in 0..8 {
            let id = store.create(draft(2), t0(), heuristic).entry.id;
            store.update_status(id, EntryStatus::Served, None, t0() + Duration::minutes(i)).unwrap();
        }

        let window = store.history_window(3);
        let ids: Vec<u64> = window.iter().map(|r| r.entry_id.0).collect();
        assert_eq!(ids, vec![6, 7, 8]);
    }

    #[test]
    fn test_concurrent_updates_leave_consistent_state() {
        let store = Arc::new(EntryStore::new());
        let ids: Vec<EntryId> = (0..50).map(|_| store.create(draft(2), t0(), heuristic).entry.id).collect();

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let store = Arc::clone(&store);
                let ids = ids.clone();
                std::thread::spawn(move || {
                    let status = if worker % 2 == 0 { EntryStatus::Served } else { EntryStatus::NoShow };
                    for id in ids {
                        let _ = store.update_status(id, status, None, t0() + Duration::minutes(3));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.snapshot();
        // Each entry terminated exactly once
        assert_eq!(snapshot.history.len(), 50);
        for entry in &snapshot.entries {
            assert!(entry.status.is_terminal());
            assert!(entry.completed_at.is_some());
            assert!(entry.completed_at.unwrap() >= entry.created_at);
        }
    }
}

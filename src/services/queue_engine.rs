//! Queue engine - the public operations of the venue queue
//!
//! Ties the entry store, estimator and ranker together:
//!
//! - `check_in` validates a request, stores the entry with a heuristic
//!   estimate, then refines the estimate off the async runtime with
//!   `spawn_blocking` (the store lock is never held while training)
//! - `update_status` / `remove` delegate to the store and emit events
//! - whenever the waiting queue changes, the stored estimates of the
//!   entries still waiting are recomputed for their new positions
//! - `snapshot` / `analytics_snapshot` build read models from one
//!   consistent store snapshot
//!
//! Every operation has an `_at` form taking an explicit `now` for
//! deterministic tests.

use crate::domain::entry::{NewEntry, QueueEntry};
use crate::domain::error::{DegradedReason, QueueError, QueueResult};
use crate::domain::events::QueueEvent;
use crate::domain::types::{CheckInRequest, EntryId, EntryStatus, ServiceType};
use crate::infra::config::Config;
use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::io::event_channel::EventSender;
use crate::services::analytics::{AnalyticsParams, AnalyticsSnapshot};
use crate::services::entry_store::EntryStore;
use crate::services::estimator::{
    round_to, Estimate, EstimateSource, WaitFeatures, WaitPrediction, WaitTimeEstimator,
};
use crate::services::ranker::{top, PriorityRanker, RankedEntry, ThreadRngTieBreak, TieBreak};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of a successful check-in
#[derive(Debug, Clone, Serialize)]
pub struct CheckInOutcome {
    pub entry: QueueEntry,
    /// 1-based rank among waiting entries by creation time
    pub queue_position: usize,
    pub estimated_wait_minutes: u32,
    pub estimate_source: EstimateSource,
}

/// Single entry lookup
#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub entry: QueueEntry,
    /// Present only while the entry is waiting
    pub queue_position: Option<usize>,
}

/// Read model for the live queue display
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    /// Most recently seated entries, newest first
    pub current: Vec<QueueEntry>,
    /// Highest priority waiting entries
    pub next: Vec<RankedEntry>,
    pub total_waiting: usize,
    /// Position-based predictions for every waiting entry, in creation order
    pub predictions: Vec<WaitPrediction>,
    pub average_predicted_wait: f64,
    pub generated_at: DateTime<Utc>,
}

pub struct QueueEngine {
    store: Arc<EntryStore>,
    estimator: Arc<WaitTimeEstimator>,
    ranker: PriorityRanker,
    tie_break: Arc<dyn TieBreak>,
    config: Config,
    metrics: Arc<Metrics>,
    events: Option<EventSender>,
}

impl QueueEngine {
    pub fn new(config: Config, metrics: Arc<Metrics>) -> Self {
        Self {
            store: Arc::new(EntryStore::new()),
            estimator: Arc::new(WaitTimeEstimator::new(config.estimator())),
            ranker: PriorityRanker::new(config.ranker()),
            tie_break: Arc::new(ThreadRngTieBreak),
            config,
            metrics,
            events: None,
        }
    }

    /// Builder method to publish events on `sender`
    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    /// Builder method to replace the ranking and prediction noise source
    pub fn with_tie_break(mut self, tie_break: Arc<dyn TieBreak>) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub async fn check_in(&self, request: CheckInRequest) -> QueueResult<CheckInOutcome> {
        self.check_in_at(request, Utc::now()).await
    }

    /// Register a customer.
    ///
    /// Validation failures create nothing. Estimation problems never fail the
    /// check-in; they degrade to the heuristic estimate.
    pub async fn check_in_at(&self, request: CheckInRequest, now: DateTime<Utc>) -> QueueResult<CheckInOutcome> {
        let draft = match self.validate(request) {
            Ok(draft) => draft,
            Err(e) => {
                self.metrics.record_validation_rejection();
                warn!(error = %e, "check_in_rejected");
                return Err(e);
            }
        };

        let started = Instant::now();
        let estimator = &self.estimator;
        let mut waiting_count = 0;
        let created = self
            .store
            .try_create(draft, now, self.config.max_queue_size(), |count| {
                waiting_count = count;
                estimator.heuristic_minutes(count)
            })
            .inspect_err(|e| {
                self.metrics.record_validation_rejection();
                warn!(error = %e, "check_in_rejected");
            })?;

        let estimate = self.refine_estimate(&created.entry, waiting_count).await;
        self.metrics.record_estimate(estimate.source.is_model(), started.elapsed().as_micros() as u64);

        if let Some(reason) = &estimate.degraded {
            match reason {
                DegradedReason::InsufficientHistory { .. } => {
                    debug!(entry_id = %created.entry.id, reason = %reason, "estimate_degraded");
                }
                _ => {
                    warn!(entry_id = %created.entry.id, reason = %reason, "estimate_degraded");
                }
            }
        }

        let mut entry = created.entry;
        if estimate.minutes != entry.estimated_wait_minutes {
            entry = match self.store.set_estimate(entry.id, estimate.minutes) {
                Ok(updated) => updated,
                Err(_) => {
                    // Removed while the estimate was being computed
                    entry.estimated_wait_minutes = estimate.minutes;
                    entry
                }
            };
        }

        // A backdated check-in can land ahead of entries already waiting
        if created.queue_position < waiting_count {
            self.refresh_waiting_estimates(created.queue_position + 1);
        }

        self.metrics.record_check_in();
        info!(
            entry_id = %entry.id,
            party_size = %entry.party_size,
            service_type = %entry.service_type,
            service = %self.config.service(entry.service_type).display_name,
            location = %entry.location,
            queue_position = %created.queue_position,
            estimated_wait = %estimate.minutes,
            model = %estimate.source.is_model(),
            "entry_checked_in"
        );

        self.emit(QueueEvent::EntryAdded {
            entry: entry.clone(),
            queue_position: created.queue_position,
            estimated_wait_minutes: estimate.minutes,
        });

        Ok(CheckInOutcome {
            entry,
            queue_position: created.queue_position,
            estimated_wait_minutes: estimate.minutes,
            estimate_source: estimate.source,
        })
    }

    fn validate(&self, request: CheckInRequest) -> QueueResult<NewEntry> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(QueueError::validation("name is required"));
        }

        let service_type: ServiceType = request.service_type.trim().parse().map_err(QueueError::validation)?;
        let settings = self.config.service(service_type);

        if request.party_size < 1 || request.party_size > settings.max_party_size {
            return Err(QueueError::validation(format!(
                "party size {} is outside 1..={} for {}",
                request.party_size, settings.max_party_size, service_type
            )));
        }

        let location = request.location.trim();
        if !settings.allows_location(location) {
            return Err(QueueError::validation(format!(
                "location '{location}' is not available for {service_type}"
            )));
        }

        let phone = request.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());

        Ok(NewEntry {
            name: name.to_string(),
            phone,
            party_size: request.party_size,
            service_type,
            location: location.to_string(),
        })
    }

    /// Train on a copy of the history window without holding the store lock
    async fn refine_estimate(&self, entry: &QueueEntry, waiting_count: usize) -> Estimate {
        let history = self.store.history_window(self.config.estimator().history_window);
        if !self.estimator.has_enough_history(history.len()) {
            return self.estimator.fallback(
                waiting_count,
                DegradedReason::InsufficientHistory {
                    available: history.len(),
                    required: self.config.estimator().min_history,
                },
            );
        }

        let estimator = Arc::clone(&self.estimator);
        let features = WaitFeatures::of(entry);
        let handle =
            tokio::task::spawn_blocking(move || estimator.estimate(&features, &history, waiting_count));

        match handle.await {
            Ok(estimate) => estimate,
            Err(e) => self.estimator.fallback(waiting_count, DegradedReason::WorkerFailed(e.to_string())),
        }
    }

    pub fn update_status(&self, id: EntryId, status: EntryStatus, notes: Option<String>) -> QueueResult<QueueEntry> {
        self.update_status_at(id, status, notes, Utc::now())
    }

    /// Update by status name; an unknown name is a validation error
    pub fn update_status_named(&self, id: EntryId, status: &str, notes: Option<String>) -> QueueResult<QueueEntry> {
        let status: EntryStatus = status.trim().parse().map_err(QueueError::validation)?;
        self.update_status(id, status, notes)
    }

    /// Move an entry to `status`. Emits `StatusChanged` only when the value
    /// actually changes.
    pub fn update_status_at(
        &self,
        id: EntryId,
        status: EntryStatus,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> QueueResult<QueueEntry> {
        let update = match self.store.update_status(id, status, notes, now) {
            Ok(update) => update,
            Err(e) => {
                if matches!(e, QueueError::InvalidTransition { .. }) {
                    self.metrics.record_invalid_transition();
                }
                warn!(entry_id = %id, requested = %status, error = %e, "status_update_rejected");
                return Err(e);
            }
        };

        if update.changed() {
            self.metrics.record_status_change();
            info!(
                entry_id = %id,
                old_status = %update.previous,
                new_status = %update.entry.status,
                "entry_status_changed"
            );
            self.emit(QueueEvent::StatusChanged {
                entry_id: id,
                old_status: update.previous,
                new_status: update.entry.status,
            });

            if update.previous == EntryStatus::Waiting || update.entry.status.is_terminal() {
                self.refresh_waiting_estimates(1);
            }
        }

        Ok(update.entry)
    }

    /// Delete an entry; its history stays
    pub fn remove(&self, id: EntryId) -> QueueResult<QueueEntry> {
        let removed = self.store.remove(id)?;
        self.metrics.record_entry_removed();
        info!(entry_id = %id, status = %removed.status, "entry_removed");
        self.emit(QueueEvent::EntryRemoved { entry_id: id });

        if removed.is_waiting() {
            self.refresh_waiting_estimates(1);
        }
        Ok(removed)
    }

    /// Recompute stored estimates of waiting entries from `from_position` on.
    ///
    /// The model is fitted from a copy of the history window before the store
    /// write lock is taken.
    fn refresh_waiting_estimates(&self, from_position: usize) {
        let history = self.store.history_window(self.config.estimator().history_window);
        let model = self.estimator.fit_recent(&history);
        let estimator = &self.estimator;

        let changed = self.store.refresh_estimates(from_position, |entry, position| {
            estimator.estimate_at_position(model.as_ref(), &WaitFeatures::of(entry), position)
        });
        if changed > 0 {
            debug!(changed = %changed, model = %model.is_some(), "waiting_estimates_refreshed");
        }
    }

    pub fn lookup(&self, id: EntryId) -> QueueResult<EntryView> {
        let (entry, queue_position) = self.store.get_with_position(id)?;
        Ok(EntryView { entry, queue_position })
    }

    /// All entries in creation order, optionally only one status
    pub fn entries(&self, status: Option<EntryStatus>) -> Vec<QueueEntry> {
        self.store.list(status)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> QueueSnapshot {
        let snapshot = self.store.snapshot();
        let k = self.config.top_k();

        let mut current: Vec<QueueEntry> = snapshot.with_status(EntryStatus::Seated).cloned().collect();
        current.sort_by(|a, b| {
            let a_at = a.updated_at.unwrap_or(a.created_at);
            let b_at = b.updated_at.unwrap_or(b.created_at);
            b_at.cmp(&a_at).then(b.id.cmp(&a.id))
        });
        current.truncate(k);

        let ranked = self.ranker.rank(snapshot.waiting(), self.config.services(), self.tie_break.as_ref(), now);
        let next = top(&ranked, k).to_vec();

        let waiting: Vec<&QueueEntry> = snapshot.waiting().collect();
        let predictions = self.estimator.queue_predictions(
            &waiting,
            &snapshot.history,
            self.config.services(),
            self.tie_break.as_ref(),
        );
        let average_predicted_wait = if predictions.is_empty() {
            0.0
        } else {
            round_to(
                predictions.iter().map(|p| p.estimated_wait).sum::<f64>() / predictions.len() as f64,
                1,
            )
        };

        debug!(waiting = %waiting.len(), seated = %current.len(), "queue_snapshot_built");

        QueueSnapshot {
            current,
            next,
            total_waiting: waiting.len(),
            predictions,
            average_predicted_wait,
            generated_at: now,
        }
    }

    pub fn analytics_snapshot(&self) -> AnalyticsSnapshot {
        self.analytics_snapshot_at(Utc::now())
    }

    pub fn analytics_snapshot_at(&self, now: DateTime<Utc>) -> AnalyticsSnapshot {
        let params = AnalyticsParams {
            window_days: self.config.daily_window_days(),
            peak_hours: self.config.peak_hours(),
            max_capacity: self.config.max_capacity(),
        };
        AnalyticsSnapshot::build(&self.store.snapshot(), self.config.services(), params, now)
    }

    /// Metrics summary with current queue gauges
    pub fn metrics_report(&self) -> MetricsSummary {
        let snapshot = self.store.snapshot();
        let seated = snapshot.with_status(EntryStatus::Seated).count();
        self.metrics.report(snapshot.waiting().count(), seated)
    }

    fn emit(&self, event: QueueEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }
}

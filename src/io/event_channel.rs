//! Bounded channel for queue events
//!
//! Producers never block: when the channel is full the event is dropped and
//! counted in metrics.

use crate::domain::events::QueueEvent;
use crate::infra::metrics::Metrics;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Sender handle for queue events
///
/// Clone this to share across multiple producers.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<QueueEvent>,
    metrics: Arc<Metrics>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<QueueEvent>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics }
    }

    /// Queue an event for delivery. Returns false if it was dropped.
    pub fn send(&self, event: QueueEvent) -> bool {
        let kind = event.as_str();
        let entry_id = event.entry_id();
        match self.tx.try_send(event) {
            Ok(()) => {
                self.metrics.record_event_emitted();
                debug!(event = %kind, entry_id = %entry_id, "event_emitted");
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.record_event_dropped();
                warn!(event = %kind, entry_id = %entry_id, reason = "channel_full", "event_dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.record_event_dropped();
                debug!(event = %kind, entry_id = %entry_id, reason = "channel_closed", "event_dropped");
                false
            }
        }
    }
}

/// Create a new event channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
pub fn create_event_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (EventSender, mpsc::Receiver<QueueEvent>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (EventSender::new(tx, metrics), rx)
}

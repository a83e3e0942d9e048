//! Domain models - core queue types
//!
//! This module contains the canonical data types used throughout the system:
//! - `QueueEntry` - one customer's record from check-in to terminal status
//! - `ServiceHistoryRecord` - append-only record of a completed entry
//! - `QueueEvent` - events emitted for real-time collaborators
//! - `QueueError` - caller-facing error taxonomy

pub mod entry;
pub mod error;
pub mod events;
pub mod types;

// Re-export commonly used types at module level
pub use entry::{NewEntry, QueueEntry, ServiceHistoryRecord};
pub use error::{DegradedReason, QueueError, QueueResult};
pub use events::QueueEvent;
pub use types::{CheckInRequest, EntryId, EntryStatus, ServiceType};

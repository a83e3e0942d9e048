//! Error taxonomy for queue operations

use crate::domain::types::{EntryId, EntryStatus};
use thiserror::Error;

/// Errors surfaced to callers of the queue engine.
///
/// None of these are retried internally and none leave the store partially
/// mutated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Bad input: unknown service type, disallowed location, party size out of
    /// range, missing required field, or a full queue
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("queue entry not found: {0}")]
    NotFound(EntryId),

    /// Status change that would move an entry backwards or out of a terminal state
    #[error("entry {id} cannot move from {from} to {to}")]
    InvalidTransition { id: EntryId, from: EntryStatus, to: EntryStatus },
}

impl QueueError {
    pub fn validation(reason: impl Into<String>) -> Self {
        QueueError::Validation { reason: reason.into() }
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Why a wait estimate fell back to the heuristic.
///
/// Internal diagnostic only; never returned to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DegradedReason {
    #[error("insufficient history ({available} of {required} records)")]
    InsufficientHistory { available: usize, required: usize },

    #[error("training data contains non-finite values")]
    MalformedFeatures,

    #[error("training data does not determine a model")]
    SingularSystem,

    #[error("estimation worker failed: {0}")]
    WorkerFailed(String),
}

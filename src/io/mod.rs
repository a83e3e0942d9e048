//! IO modules - event delivery
//!
//! - `event_channel` - Bounded, non-blocking channel for queue events
//! - `journal` - JSONL file sink consuming the event channel

pub mod event_channel;
pub mod journal;

// Re-export commonly used types
pub use event_channel::{create_event_channel, EventSender};
pub use journal::EventJournal;

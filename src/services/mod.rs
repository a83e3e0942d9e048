//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `entry_store` - Authoritative entry and history store
//! - `estimator` - Wait-time estimation (trained model and heuristic)
//! - `ranker` - Priority scoring of waiting entries
//! - `analytics` - Derived statistics over store snapshots
//! - `queue_engine` - Public queue operations

pub mod analytics;
pub mod entry_store;
pub mod estimator;
pub mod queue_engine;
pub mod ranker;

// Re-export commonly used types
pub use analytics::AnalyticsSnapshot;
pub use entry_store::{EntryStore, StoreSnapshot};
pub use estimator::{Estimate, EstimateSource, WaitTimeEstimator};
pub use queue_engine::{CheckInOutcome, EntryView, QueueEngine, QueueSnapshot};
pub use ranker::{NoTieBreak, PriorityRanker, RankedEntry, SeededTieBreak, ThreadRngTieBreak, TieBreak};

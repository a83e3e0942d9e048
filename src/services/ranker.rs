//! Priority ranking of waiting entries
//!
//! Scores are recomputed on every call since they depend on how long each
//! entry has been waiting:
//!
//! ```text
//! score = wait_weight * current_wait_minutes
//!       + party_bonus(party_size)
//!       + priority_weight(service_type)
//!       + tie_break            // in [0, 1)
//! ```
//!
//! Entries are sorted by descending score with a stable sort, so equal scores
//! keep creation order.

use crate::domain::entry::QueueEntry;
use crate::infra::config::{RankerConfig, ServiceTable};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::cmp::Ordering;

/// Source of the small random value used to break score ties
pub trait TieBreak: Send + Sync {
    /// Next sample in `[0, 1)`
    fn sample(&self) -> f64;
}

/// Fresh randomness from the thread-local generator
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngTieBreak;

impl TieBreak for ThreadRngTieBreak {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Reproducible sequence from a fixed seed
pub struct SeededTieBreak {
    rng: Mutex<StdRng>,
}

impl SeededTieBreak {
    pub fn new(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl TieBreak for SeededTieBreak {
    fn sample(&self) -> f64 {
        self.rng.lock().gen::<f64>()
    }
}

/// Always zero; ranking becomes fully deterministic
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTieBreak;

impl TieBreak for NoTieBreak {
    fn sample(&self) -> f64 {
        0.0
    }
}

/// A waiting entry with its score for one ranking pass
#[derive(Debug, Clone, Serialize)]
pub struct RankedEntry {
    /// 1-based service order
    pub rank: usize,
    pub entry: QueueEntry,
    /// Score including the tie-break sample
    pub score: f64,
    /// Score without the tie-break sample
    pub base_score: f64,
}

pub struct PriorityRanker {
    config: RankerConfig,
}

impl PriorityRanker {
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    pub fn party_bonus(&self, party_size: u32) -> f64 {
        if party_size > self.config.large_party_threshold {
            self.config.large_party_bonus
        } else if party_size > self.config.medium_party_threshold {
            self.config.medium_party_bonus
        } else {
            0.0
        }
    }

    /// Score without the tie-break component
    pub fn base_score(&self, entry: &QueueEntry, services: &ServiceTable, now: DateTime<Utc>) -> f64 {
        self.config.wait_weight * entry.current_wait_minutes(now)
            + self.party_bonus(entry.party_size)
            + services.get(entry.service_type).priority_weight
    }

    /// Rank every waiting entry in `entries`. Non-waiting entries are skipped.
    ///
    /// Input order is the fallback order for equal scores, so callers pass
    /// entries sorted by creation time.
    pub fn rank<'a, I>(
        &self,
        entries: I,
        services: &ServiceTable,
        tie_break: &dyn TieBreak,
        now: DateTime<Utc>,
    ) -> Vec<RankedEntry>
    where
        I: IntoIterator<Item = &'a QueueEntry>,
    {
        let mut ranked: Vec<RankedEntry> = entries
            .into_iter()
            .filter(|e| e.is_waiting())
            .map(|entry| {
                let base_score = self.base_score(entry, services, now);
                let noise = tie_break.sample().clamp(0.0, 1.0 - f64::EPSILON);
                RankedEntry { rank: 0, entry: entry.clone(), score: base_score + noise, base_score }
            })
            .collect();

        // Stable: ties keep input order
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        for (i, r) in ranked.iter_mut().enumerate() {
            r.rank = i + 1;
        }
        ranked
    }
}

/// First `k` entries of a ranking
#[inline]
pub fn top(ranked: &[RankedEntry], k: usize) -> &[RankedEntry] {
    &ranked[..ranked.len().min(k)]
}

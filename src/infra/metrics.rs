//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations so recording never contends with
//! the entry store lock. `report()` swaps the periodic counters to zero.
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical counters
//! only; do NOT use them for coordination or logic decisions.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries for estimation latency (microseconds)
/// Buckets: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, >25600
const BUCKET_BOUNDS: [u64; 10] = [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];
pub const METRICS_NUM_BUCKETS: usize = 11;

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

#[inline]
fn swap_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
        [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector for the queue engine
pub struct Metrics {
    check_ins_total: AtomicU64,
    check_ins_since_report: AtomicU64,
    validation_rejections_total: AtomicU64,
    status_changes_total: AtomicU64,
    invalid_transitions_total: AtomicU64,
    entries_removed_total: AtomicU64,
    /// Estimates produced by the trained model
    estimates_trained_total: AtomicU64,
    /// Estimates that fell back to the heuristic
    estimates_degraded_total: AtomicU64,
    events_emitted_total: AtomicU64,
    /// Events dropped because the channel was full or closed
    events_dropped_total: AtomicU64,
    /// Estimation latency histogram (reset on report)
    estimate_latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    estimate_latency_sum_us: AtomicU64,
    estimate_latency_max_us: AtomicU64,
    estimates_since_report: AtomicU64,
    last_report_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            check_ins_total: AtomicU64::new(0),
            check_ins_since_report: AtomicU64::new(0),
            validation_rejections_total: AtomicU64::new(0),
            status_changes_total: AtomicU64::new(0),
            invalid_transitions_total: AtomicU64::new(0),
            entries_removed_total: AtomicU64::new(0),
            estimates_trained_total: AtomicU64::new(0),
            estimates_degraded_total: AtomicU64::new(0),
            events_emitted_total: AtomicU64::new(0),
            events_dropped_total: AtomicU64::new(0),
            estimate_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            estimate_latency_sum_us: AtomicU64::new(0),
            estimate_latency_max_us: AtomicU64::new(0),
            estimates_since_report: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_check_in(&self) {
        self.check_ins_total.fetch_add(1, Ordering::Relaxed);
        self.check_ins_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_validation_rejection(&self) {
        self.validation_rejections_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_status_change(&self) {
        self.status_changes_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_invalid_transition(&self) {
        self.invalid_transitions_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_entry_removed(&self) {
        self.entries_removed_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an estimate and how long it took to produce
    pub fn record_estimate(&self, trained: bool, latency_us: u64) {
        if trained {
            self.estimates_trained_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.estimates_degraded_total.fetch_add(1, Ordering::Relaxed);
        }
        self.estimates_since_report.fetch_add(1, Ordering::Relaxed);
        self.estimate_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.estimate_latency_max_us, latency_us);
        self.estimate_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_emitted(&self) {
        self.events_emitted_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn check_ins_total(&self) -> u64 {
        self.check_ins_total.load(Ordering::Relaxed)
    }

    pub fn estimates_trained_total(&self) -> u64 {
        self.estimates_trained_total.load(Ordering::Relaxed)
    }

    pub fn estimates_degraded_total(&self) -> u64 {
        self.estimates_degraded_total.load(Ordering::Relaxed)
    }

    pub fn events_dropped_total(&self) -> u64 {
        self.events_dropped_total.load(Ordering::Relaxed)
    }

    /// Build a summary and reset the periodic counters
    pub fn report(&self, waiting: usize, seated: usize) -> MetricsSummary {
        let check_ins = self.check_ins_since_report.swap(0, Ordering::Relaxed);
        let estimates = self.estimates_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.estimate_latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.estimate_latency_max_us.swap(0, Ordering::Relaxed);
        let buckets = swap_buckets(&self.estimate_latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let check_ins_per_min = if elapsed.as_secs_f64() > 0.0 {
            check_ins as f64 * 60.0 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            check_ins_total: self.check_ins_total.load(Ordering::Relaxed),
            check_ins_per_min,
            validation_rejections_total: self.validation_rejections_total.load(Ordering::Relaxed),
            status_changes_total: self.status_changes_total.load(Ordering::Relaxed),
            invalid_transitions_total: self.invalid_transitions_total.load(Ordering::Relaxed),
            entries_removed_total: self.entries_removed_total.load(Ordering::Relaxed),
            estimates_trained_total: self.estimates_trained_total.load(Ordering::Relaxed),
            estimates_degraded_total: self.estimates_degraded_total.load(Ordering::Relaxed),
            events_emitted_total: self.events_emitted_total.load(Ordering::Relaxed),
            events_dropped_total: self.events_dropped_total.load(Ordering::Relaxed),
            estimate_avg_us: if estimates > 0 { latency_sum / estimates } else { 0 },
            estimate_max_us: latency_max,
            estimate_p50_us: percentile_from_buckets(&buckets, 0.50),
            estimate_p99_us: percentile_from_buckets(&buckets, 0.99),
            estimate_buckets: buckets,
            waiting,
            seated,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time metrics report
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub check_ins_total: u64,
    pub check_ins_per_min: f64,
    pub validation_rejections_total: u64,
    pub status_changes_total: u64,
    pub invalid_transitions_total: u64,
    pub entries_removed_total: u64,
    pub estimates_trained_total: u64,
    pub estimates_degraded_total: u64,
    pub events_emitted_total: u64,
    pub events_dropped_total: u64,
    pub estimate_avg_us: u64,
    pub estimate_max_us: u64,
    pub estimate_p50_us: u64,
    pub estimate_p99_us: u64,
    /// Bounds: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, >25600 µs
    pub estimate_buckets: [u64; METRICS_NUM_BUCKETS],
    pub waiting: usize,
    pub seated: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            check_ins_total = %self.check_ins_total,
            check_ins_per_min = format!("{:.1}", self.check_ins_per_min),
            rejected = %self.validation_rejections_total,
            status_changes = %self.status_changes_total,
            invalid_transitions = %self.invalid_transitions_total,
            removed = %self.entries_removed_total,
            estimates_trained = %self.estimates_trained_total,
            estimates_degraded = %self.estimates_degraded_total,
            estimate_p99_us = %self.estimate_p99_us,
            events_dropped = %self.events_dropped_total,
            waiting = %self.waiting,
            seated = %self.seated,
            "metrics"
        );
    }
}

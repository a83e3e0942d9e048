//! Wait-time estimation
//!
//! Two estimators share this module:
//!
//! - Check-in estimate: a least-squares linear model over
//!   `[party_size, service_code, hour_of_day]`, retrained on every call from
//!   the most recent history window. Falls back to
//!   `heuristic_unit_minutes * waiting_count` when history is short or the
//!   fit fails.
//! - Snapshot predictions: position based, `(i + 1) * avg_service_minutes`
//!   scaled by party size, service type and a small jitter.
//!
//! All estimates are whole minutes and never below `min_estimate_minutes`.

use crate::domain::entry::{QueueEntry, ServiceHistoryRecord};
use crate::domain::error::DegradedReason;
use crate::domain::types::{EntryId, EntryStatus, ServiceType};
use crate::infra::config::{EstimatorConfig, ServiceTable};
use crate::services::ranker::TieBreak;
use serde::Serialize;

/// Number of model features (intercept excluded)
const NUM_FEATURES: usize = 3;

/// Ridge penalty on centered features
const RIDGE_LAMBDA: f64 = 1e-6;

/// Pivot magnitude below which the normal equations are treated as singular
const PIVOT_EPSILON: f64 = 1e-12;

const LARGE_PARTY_SIZE: u32 = 4;
const LARGE_PARTY_FACTOR: f64 = 1.2;
const MEDIUM_PARTY_SIZE: u32 = 2;
const MEDIUM_PARTY_FACTOR: f64 = 1.1;

/// Inputs the model predicts from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitFeatures {
    pub party_size: u32,
    pub service_type: ServiceType,
    pub hour_of_day: u32,
}

impl WaitFeatures {
    pub fn new(party_size: u32, service_type: ServiceType, hour_of_day: u32) -> Self {
        Self { party_size, service_type, hour_of_day }
    }

    pub fn of(entry: &QueueEntry) -> Self {
        Self::new(entry.party_size, entry.service_type, entry.created_hour())
    }

    fn vector(&self) -> [f64; NUM_FEATURES] {
        [
            self.party_size as f64,
            self.service_type.feature_code() as f64,
            self.hour_of_day as f64,
        ]
    }
}

fn record_vector(record: &ServiceHistoryRecord) -> [f64; NUM_FEATURES] {
    [record.party_size as f64, record.service_code as f64, record.hour_of_day as f64]
}

/// How an estimate was produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimateSource {
    Model { training_records: usize },
    Heuristic { reason: String },
}

impl EstimateSource {
    pub fn is_model(&self) -> bool {
        matches!(self, EstimateSource::Model { .. })
    }
}

/// A wait estimate in whole minutes
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub minutes: u32,
    pub source: EstimateSource,
    /// Why the model was not used, if it wasn't
    pub degraded: Option<DegradedReason>,
}

/// Ordinary least squares fit `wait = intercept + coefficients . features`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearWaitModel {
    pub intercept: f64,
    pub coefficients: [f64; NUM_FEATURES],
    pub training_records: usize,
}

impl LinearWaitModel {
    /// Fit on `records`.
    ///
    /// Features are centered before solving so a constant column (every
    /// record from one service type, say) collapses to a zero coefficient
    /// under the ridge term instead of making the system singular.
    pub fn fit(records: &[ServiceHistoryRecord]) -> Result<Self, DegradedReason> {
        if records.is_empty() {
            return Err(DegradedReason::InsufficientHistory { available: 0, required: 1 });
        }

        let rows: Vec<[f64; NUM_FEATURES]> = records.iter().map(record_vector).collect();
        let targets: Vec<f64> = records.iter().map(|r| r.actual_wait_minutes).collect();

        let malformed = records.iter().any(|r| r.hour_of_day > 23 || r.service_code > 2)
            || targets.iter().any(|y| !y.is_finite() || *y < 0.0)
            || rows.iter().flatten().any(|x| !x.is_finite());
        if malformed {
            return Err(DegradedReason::MalformedFeatures);
        }

        let n = records.len() as f64;
        let mut x_mean = [0.0; NUM_FEATURES];
        for row in &rows {
            for (m, x) in x_mean.iter_mut().zip(row) {
                *m += x / n;
            }
        }
        let y_mean = targets.iter().sum::<f64>() / n;

        // Normal equations on centered data: (XᵀX + λI) b = Xᵀy
        let mut xtx = [[0.0; NUM_FEATURES]; NUM_FEATURES];
        let mut xty = [0.0; NUM_FEATURES];
        for (row, y) in rows.iter().zip(&targets) {
            let centered: [f64; NUM_FEATURES] = std::array::from_fn(|j| row[j] - x_mean[j]);
            let dy = y - y_mean;
            for i in 0..NUM_FEATURES {
                xty[i] += centered[i] * dy;
                for j in 0..NUM_FEATURES {
                    xtx[i][j] += centered[i] * centered[j];
                }
            }
        }
        for (i, row) in xtx.iter_mut().enumerate() {
            row[i] += RIDGE_LAMBDA;
        }

        let coefficients = solve(xtx, xty).ok_or(DegradedReason::SingularSystem)?;
        let intercept = y_mean - coefficients.iter().zip(&x_mean).map(|(b, m)| b * m).sum::<f64>();

        if !intercept.is_finite() || coefficients.iter().any(|b| !b.is_finite()) {
            return Err(DegradedReason::SingularSystem);
        }

        Ok(Self { intercept, coefficients, training_records: records.len() })
    }

    pub fn predict(&self, features: &WaitFeatures) -> f64 {
        self.intercept
            + self.coefficients.iter().zip(features.vector()).map(|(b, x)| b * x).sum::<f64>()
    }
}

/// Gaussian elimination with partial pivoting
fn solve(
    mut a: [[f64; NUM_FEATURES]; NUM_FEATURES],
    mut b: [f64; NUM_FEATURES],
) -> Option<[f64; NUM_FEATURES]> {
    for col in 0..NUM_FEATURES {
        let pivot = (col..NUM_FEATURES)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < PIVOT_EPSILON {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..NUM_FEATURES {
            let factor = a[row][col] / a[col][col];
            for k in col..NUM_FEATURES {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; NUM_FEATURES];
    for row in (0..NUM_FEATURES).rev() {
        let tail: f64 = (row + 1..NUM_FEATURES).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

/// Position-based wait prediction for one waiting entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaitPrediction {
    pub entry_id: EntryId,
    /// 1-based position by creation time
    pub position: usize,
    /// Minutes, one decimal
    pub estimated_wait: f64,
}

pub struct WaitTimeEstimator {
    config: EstimatorConfig,
}

impl WaitTimeEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Whether `history_len` records are enough to train
    #[inline]
    pub fn has_enough_history(&self, history_len: usize) -> bool {
        history_len >= self.config.min_history
    }

    /// `heuristic_unit_minutes` per waiting entry, floored at the minimum
    pub fn heuristic_minutes(&self, waiting_count: usize) -> u32 {
        let minutes = (self.config.heuristic_unit_minutes as u64).saturating_mul(waiting_count as u64);
        self.clamp(minutes.min(u32::MAX as u64) as u32)
    }

    /// Degraded estimate with the reason attached
    pub fn fallback(&self, waiting_count: usize, reason: DegradedReason) -> Estimate {
        Estimate {
            minutes: self.heuristic_minutes(waiting_count),
            source: EstimateSource::Heuristic { reason: reason.to_string() },
            degraded: Some(reason),
        }
    }

    /// Estimate the wait for `features`.
    ///
    /// Trains on the last `history_window` records of `history` (oldest
    /// first). `waiting_count` includes the entry being estimated and only
    /// feeds the heuristic.
    pub fn estimate(
        &self,
        features: &WaitFeatures,
        history: &[ServiceHistoryRecord],
        waiting_count: usize,
    ) -> Estimate {
        if !self.has_enough_history(history.len()) {
            return self.fallback(
                waiting_count,
                DegradedReason::InsufficientHistory {
                    available: history.len(),
                    required: self.config.min_history,
                },
            );
        }

        let start = history.len().saturating_sub(self.config.history_window);
        let window = &history[start..];

        match LinearWaitModel::fit(window) {
            Ok(model) => {
                let predicted = model.predict(features);
                if !predicted.is_finite() {
                    return self.fallback(waiting_count, DegradedReason::SingularSystem);
                }
                Estimate {
                    minutes: self.clamp_f64(predicted),
                    source: EstimateSource::Model { training_records: model.training_records },
                    degraded: None,
                }
            }
            Err(reason) => self.fallback(waiting_count, reason),
        }
    }

    /// Model trained on the most recent window, if there is enough usable
    /// history
    pub fn fit_recent(&self, history: &[ServiceHistoryRecord]) -> Option<LinearWaitModel> {
        if !self.has_enough_history(history.len()) {
            return None;
        }
        let start = history.len().saturating_sub(self.config.history_window);
        LinearWaitModel::fit(&history[start..]).ok()
    }

    /// Stored estimate for a waiting entry at 1-based `position`: the model
    /// prediction when one is available, else the heuristic for the position
    pub fn estimate_at_position(
        &self,
        model: Option<&LinearWaitModel>,
        features: &WaitFeatures,
        position: usize,
    ) -> u32 {
        match model.map(|m| m.predict(features)) {
            Some(predicted) if predicted.is_finite() => self.clamp_f64(predicted),
            _ => self.heuristic_minutes(position),
        }
    }

    /// Mean wait of served history records, or the configured default
    pub fn average_service_minutes(&self, history: &[ServiceHistoryRecord]) -> f64 {
        let served: Vec<f64> = history
            .iter()
            .filter(|r| r.status == EntryStatus::Served)
            .map(|r| r.actual_wait_minutes)
            .collect();
        if served.is_empty() {
            self.config.default_service_minutes
        } else {
            served.iter().sum::<f64>() / served.len() as f64
        }
    }

    /// Position-based predictions for `waiting`, which must be in creation
    /// order.
    pub fn queue_predictions(
        &self,
        waiting: &[&QueueEntry],
        history: &[ServiceHistoryRecord],
        services: &ServiceTable,
        tie_break: &dyn TieBreak,
    ) -> Vec<WaitPrediction> {
        let avg = self.average_service_minutes(history);

        waiting
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let jitter = 0.9 + 0.2 * tie_break.sample().clamp(0.0, 1.0);
                let raw = (i + 1) as f64
                    * avg
                    * party_factor(entry.party_size)
                    * services.get(entry.service_type).prediction_factor
                    * jitter;
                WaitPrediction {
                    entry_id: entry.id,
                    position: i + 1,
                    estimated_wait: round_to(raw, 1),
                }
            })
            .collect()
    }

    fn clamp(&self, minutes: u32) -> u32 {
        minutes.max(self.config.min_estimate_minutes)
    }

    fn clamp_f64(&self, minutes: f64) -> u32 {
        let rounded = minutes.round().clamp(0.0, u32::MAX as f64) as u32;
        self.clamp(rounded)
    }
}

fn party_factor(party_size: u32) -> f64 {
    if party_size > LARGE_PARTY_SIZE {
        LARGE_PARTY_FACTOR
    } else if party_size > MEDIUM_PARTY_SIZE {
        MEDIUM_PARTY_FACTOR
    } else {
        1.0
    }
}

/// Round to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

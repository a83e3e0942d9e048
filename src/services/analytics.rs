//! Derived statistics over a store snapshot
//!
//! Every function here is pure: it reads a `StoreSnapshot` and an explicit
//! `now` and never touches the live store. All day and hour boundaries are
//! UTC.

use crate::domain::entry::minutes_between;
use crate::domain::types::{EntryStatus, ServiceType};
use crate::infra::config::ServiceTable;
use crate::services::entry_store::StoreSnapshot;
use crate::services::estimator::round_to;
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyWait {
    pub hour: u32,
    pub average_wait: f64,
    pub max_wait: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceTypeCount {
    pub service_type: ServiceType,
    /// Configured display name
    pub label: String,
    pub count: usize,
}

/// Everything the analytics view shows, computed from one snapshot
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSnapshot {
    pub daily_counts: Vec<DailyCount>,
    pub peak_hours: Vec<String>,
    pub wait_time_trends: Vec<HourlyWait>,
    pub service_type_distribution: Vec<ServiceTypeCount>,
    pub current_capacity: f64,
    pub average_served_wait: f64,
    pub average_current_wait: f64,
    pub total_entries: usize,
    pub generated_at: DateTime<Utc>,
}

/// Settings for `AnalyticsSnapshot::build`
#[derive(Debug, Clone, Copy)]
pub struct AnalyticsParams {
    pub window_days: u32,
    pub peak_hours: usize,
    pub max_capacity: u32,
}

impl AnalyticsSnapshot {
    pub fn build(
        snapshot: &StoreSnapshot,
        services: &ServiceTable,
        params: AnalyticsParams,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            daily_counts: daily_counts(snapshot, now, params.window_days),
            peak_hours: peak_hours(snapshot, params.peak_hours),
            wait_time_trends: wait_time_trends(snapshot),
            service_type_distribution: service_type_distribution(snapshot, services),
            current_capacity: current_capacity(snapshot, params.max_capacity),
            average_served_wait: average_served_wait(snapshot),
            average_current_wait: average_current_wait(snapshot, now),
            total_entries: snapshot.entries.len(),
            generated_at: now,
        }
    }
}

/// Entries created per UTC day over the trailing `window_days`, including
/// today, oldest first
pub fn daily_counts(snapshot: &StoreSnapshot, now: DateTime<Utc>, window_days: u32) -> Vec<DailyCount> {
    let mut per_day: FxHashMap<NaiveDate, usize> = FxHashMap::default();
    for entry in &snapshot.entries {
        *per_day.entry(entry.created_at.date_naive()).or_insert(0) += 1;
    }

    let today = now.date_naive();
    (0..window_days as i64)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset);
            DailyCount { date, count: per_day.get(&date).copied().unwrap_or(0) }
        })
        .collect()
}

/// Busiest creation hours as `"HH:00"` labels, most entries first.
///
/// Ties go to the earlier hour. Hours with no entries are never reported.
pub fn peak_hours(snapshot: &StoreSnapshot, top_n: usize) -> Vec<String> {
    let mut per_hour = [0usize; 24];
    for entry in &snapshot.entries {
        per_hour[entry.created_at.hour() as usize] += 1;
    }

    let mut hours: Vec<(usize, usize)> =
        per_hour.iter().enumerate().filter(|(_, &count)| count > 0).map(|(h, &c)| (h, c)).collect();
    hours.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    hours.into_iter().take(top_n).map(|(hour, _)| format!("{hour:02}:00")).collect()
}

/// Average and maximum served wait per creation hour; always 24 buckets
pub fn wait_time_trends(snapshot: &StoreSnapshot) -> Vec<HourlyWait> {
    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); 24];
    for record in snapshot.history.iter().filter(|r| r.status == EntryStatus::Served) {
        if let Some(bucket) = buckets.get_mut(record.hour_of_day as usize) {
            bucket.push(record.actual_wait_minutes);
        }
    }

    buckets
        .iter()
        .enumerate()
        .map(|(hour, waits)| {
            if waits.is_empty() {
                return HourlyWait { hour: hour as u32, average_wait: 0.0, max_wait: 0.0 };
            }
            let avg = waits.iter().sum::<f64>() / waits.len() as f64;
            let max = waits.iter().copied().fold(0.0, f64::max);
            HourlyWait { hour: hour as u32, average_wait: round_to(avg, 2), max_wait: round_to(max, 2) }
        })
        .collect()
}

/// Entry count per service type, every type present
pub fn service_type_distribution(snapshot: &StoreSnapshot, services: &ServiceTable) -> Vec<ServiceTypeCount> {
    ServiceType::ALL
        .iter()
        .map(|&service_type| ServiceTypeCount {
            service_type,
            label: services.get(service_type).display_name.clone(),
            count: snapshot.entries.iter().filter(|e| e.service_type == service_type).count(),
        })
        .collect()
}

/// Seated entries as a fraction of `max_capacity`
pub fn current_capacity(snapshot: &StoreSnapshot, max_capacity: u32) -> f64 {
    if max_capacity == 0 {
        return 0.0;
    }
    snapshot.with_status(EntryStatus::Seated).count() as f64 / max_capacity as f64
}

/// Mean actual wait of served history, 0.0 without any
pub fn average_served_wait(snapshot: &StoreSnapshot) -> f64 {
    let waits: Vec<f64> = snapshot
        .history
        .iter()
        .filter(|r| r.status == EntryStatus::Served)
        .map(|r| r.actual_wait_minutes)
        .collect();
    if waits.is_empty() {
        return 0.0;
    }
    round_to(waits.iter().sum::<f64>() / waits.len() as f64, 2)
}

/// Mean time waited so far by entries still waiting
pub fn average_current_wait(snapshot: &StoreSnapshot, now: DateTime<Utc>) -> f64 {
    let waits: Vec<f64> = snapshot.waiting().map(|e| minutes_between(e.created_at, now)).collect();
    if waits.is_empty() {
        return 0.0;
    }
    round_to(waits.iter().sum::<f64>() / waits.len() as f64, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entry::{NewEntry, QueueEntry, ServiceHistoryRecord};
    use crate::domain::types::EntryId;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, day, hour, minute, 0).unwrap()
    }

    fn entry(id: u64, service_type: ServiceType, created_at: DateTime<Utc>) -> QueueEntry {
        let draft = NewEntry {
            name: format!("guest-{id}"),
            phone: None,
            party_size: 2,
            service_type,
            location: "Main Dining".to_string(),
        };
        QueueEntry::new(EntryId(id), draft, created_at, 15)
    }

    fn complete(entry: &mut QueueEntry, status: EntryStatus, at: DateTime<Utc>) -> ServiceHistoryRecord {
        entry.apply_status(status, at);
        ServiceHistoryRecord::from_completed(entry).unwrap()
    }

    #[test]
    fn test_peak_hours_ranked_by_count() {
        let mut snapshot = StoreSnapshot::default();
        let mut id = 0;
        for (hour, count) in [(12, 3), (18, 2), (9, 1)] {
            for _ in 0..count {
                id += 1;
                snapshot.entries.push(entry(id, ServiceType::DineIn, at(10, hour, 5)));
            }
        }

        assert_eq!(peak_hours(&snapshot, 2), vec!["12:00".to_string(), "18:00".to_string()]);
        assert_eq!(peak_hours(&snapshot, 5).len(), 3);
    }

    #[test]
    fn test_peak_hours_ties_prefer_earlier_hour() {
        let snapshot = StoreSnapshot {
            entries: vec![
                entry(1, ServiceType::DineIn, at(10, 20, 0)),
                entry(2, ServiceType::DineIn, at(10, 7, 0)),
            ],
            history: Vec::new(),
        };
        assert_eq!(peak_hours(&snapshot, 1), vec!["07:00".to_string()]);
    }

    #[test]
    fn test_peak_hours_empty_snapshot() {
        assert!(peak_hours(&StoreSnapshot::default(), 2).is_empty());
    }

    #[test]
    fn test_wait_time_trends_has_24_buckets() {
        let mut a = entry(1, ServiceType::DineIn, at(10, 12, 0));
        let mut b = entry(2, ServiceType::DineIn, at(10, 12, 30));
        let mut c = entry(3, ServiceType::DineIn, at(10, 12, 0));
        let history = vec![
            complete(&mut a, EntryStatus::Served, at(10, 12, 20)),
            complete(&mut b, EntryStatus::Served, at(10, 13, 10)),
            // No-shows don't count toward wait trends
            complete(&mut c, EntryStatus::NoShow, at(10, 15, 0)),
        ];
        let snapshot = StoreSnapshot { entries: vec![a, b, c], history };

        let trends = wait_time_trends(&snapshot);
        assert_eq!(trends.len(), 24);
        assert_eq!(trends[12], HourlyWait { hour: 12, average_wait: 30.0, max_wait: 40.0 });
        assert_eq!(trends[0], HourlyWait { hour: 0, average_wait: 0.0, max_wait: 0.0 });
        assert_eq!(trends[23].hour, 23);
    }

    #[test]
    fn test_trends_for_empty_history() {
        let trends = wait_time_trends(&StoreSnapshot::default());
        assert_eq!(trends.len(), 24);
        assert!(trends.iter().all(|t| t.average_wait == 0.0 && t.max_wait == 0.0));
    }

    #[test]
    fn test_daily_counts_window() {
        let snapshot = StoreSnapshot {
            entries: vec![
                entry(1, ServiceType::DineIn, at(10, 9, 0)),
                entry(2, ServiceType::DineIn, at(10, 23, 59)),
                entry(3, ServiceType::Takeout, at(8, 12, 0)),
                // Outside a 3-day window ending on the 10th
                entry(4, ServiceType::Takeout, at(1, 12, 0)),
            ],
            history: Vec::new(),
        };

        let counts = daily_counts(&snapshot, at(10, 23, 59), 3);
        let values: Vec<usize> = counts.iter().map(|d| d.count).collect();
        assert_eq!(values, vec![1, 0, 2]);
        assert_eq!(counts[2].date, at(10, 0, 0).date_naive());
        assert_eq!(counts[0].date, at(8, 0, 0).date_naive());
    }

    #[test]
    fn test_service_type_distribution_zero_fills() {
        let snapshot = StoreSnapshot {
            entries: vec![
                entry(1, ServiceType::Delivery, at(10, 9, 0)),
                entry(2, ServiceType::Delivery, at(10, 9, 5)),
            ],
            history: Vec::new(),
        };

        let dist = service_type_distribution(&snapshot, &ServiceTable::default());
        let summary: Vec<(&str, usize)> = dist.iter().map(|d| (d.label.as_str(), d.count)).collect();
        assert_eq!(summary, vec![("Dine-in", 0), ("Takeout", 0), ("Delivery", 2)]);
        assert_eq!(dist[2].service_type, ServiceType::Delivery);
    }

    #[test]
    fn test_current_capacity() {
        let mut seated = entry(1, ServiceType::DineIn, at(10, 9, 0));
        seated.apply_status(EntryStatus::Seated, at(10, 9, 30));
        let snapshot = StoreSnapshot {
            entries: vec![seated, entry(2, ServiceType::DineIn, at(10, 9, 5))],
            history: Vec::new(),
        };

        assert_eq!(current_capacity(&snapshot, 50), 0.02);
        assert_eq!(current_capacity(&snapshot, 0), 0.0);
    }

    #[test]
    fn test_average_waits() {
        let mut served = entry(1, ServiceType::DineIn, at(10, 9, 0));
        let history = vec![complete(&mut served, EntryStatus::Served, at(10, 9, 45))];
        let snapshot = StoreSnapshot {
            entries: vec![
                served,
                entry(2, ServiceType::DineIn, at(10, 10, 0)),
                entry(3, ServiceType::Takeout, at(10, 10, 20)),
            ],
            history,
        };

        assert_eq!(average_served_wait(&snapshot), 45.0);
        // 30 and 10 minutes so far
        assert_eq!(average_current_wait(&snapshot, at(10, 10, 30)), 20.0);
        assert_eq!(average_current_wait(&StoreSnapshot::default(), at(10, 10, 30)), 0.0);
    }

    #[test]
    fn test_build_bundles_everything() {
        let snapshot = StoreSnapshot {
            entries: vec![entry(1, ServiceType::DineIn, at(10, 12, 0))],
            history: Vec::new(),
        };
        let params = AnalyticsParams { window_days: 7, peak_hours: 2, max_capacity: 50 };

        let analytics = AnalyticsSnapshot::build(&snapshot, &ServiceTable::default(), params, at(10, 13, 0));
        assert_eq!(analytics.total_entries, 1);
        assert_eq!(analytics.daily_counts.len(), 7);
        assert_eq!(analytics.peak_hours, vec!["12:00".to_string()]);
        assert_eq!(analytics.wait_time_trends.len(), 24);
        assert_eq!(analytics.service_type_distribution.len(), 3);
        assert_eq!(analytics.current_capacity, 0.0);
    }
}

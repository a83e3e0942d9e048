//! Configuration loading from TOML files
//!
//! Config file is selected via the `--config <path>` command line argument
//! (default: config/dev.toml). Every section is optional; missing values
//! fall back to the defaults below.

use crate::domain::types::ServiceType;
use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Longest trailing window accepted for daily counts
pub const MAX_DAILY_WINDOW_DAYS: u32 = 366;

/// Per service type settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceTypeConfig {
    pub display_name: String,
    pub max_party_size: u32,
    pub locations: Vec<String>,
    /// Bonus added to the priority score of waiting entries of this type
    pub priority_weight: f64,
    /// Multiplier applied to position-based wait predictions
    pub prediction_factor: f64,
}

impl ServiceTypeConfig {
    pub fn allows_location(&self, location: &str) -> bool {
        self.locations.iter().any(|l| l == location)
    }

    fn defaults_for(service_type: ServiceType) -> Self {
        match service_type {
            ServiceType::DineIn => Self {
                display_name: "Dine-in".to_string(),
                max_party_size: 20,
                locations: vec![
                    "Main Dining".to_string(),
                    "Outdoor".to_string(),
                    "Private Room".to_string(),
                ],
                priority_weight: 5.0,
                prediction_factor: 1.1,
            },
            ServiceType::Takeout => Self {
                display_name: "Takeout".to_string(),
                max_party_size: 10,
                locations: vec!["Takeout Counter".to_string()],
                priority_weight: 0.0,
                prediction_factor: 1.0,
            },
            ServiceType::Delivery => Self {
                display_name: "Delivery".to_string(),
                max_party_size: 10,
                locations: vec!["Delivery Station".to_string()],
                priority_weight: 3.0,
                prediction_factor: 0.9,
            },
        }
    }
}

/// Settings table for the closed set of service types
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceTable {
    dine_in: ServiceTypeConfig,
    takeout: ServiceTypeConfig,
    delivery: ServiceTypeConfig,
}

impl ServiceTable {
    pub fn get(&self, service_type: ServiceType) -> &ServiceTypeConfig {
        match service_type {
            ServiceType::DineIn => &self.dine_in,
            ServiceType::Takeout => &self.takeout,
            ServiceType::Delivery => &self.delivery,
        }
    }

    fn get_mut(&mut self, service_type: ServiceType) -> &mut ServiceTypeConfig {
        match service_type {
            ServiceType::DineIn => &mut self.dine_in,
            ServiceType::Takeout => &mut self.takeout,
            ServiceType::Delivery => &mut self.delivery,
        }
    }
}

impl Default for ServiceTable {
    fn default() -> Self {
        Self {
            dine_in: ServiceTypeConfig::defaults_for(ServiceType::DineIn),
            takeout: ServiceTypeConfig::defaults_for(ServiceType::Takeout),
            delivery: ServiceTypeConfig::defaults_for(ServiceType::Delivery),
        }
    }
}

/// Wait-time estimator settings
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct EstimatorConfig {
    /// Minimum history records before the model is trained
    #[serde(default = "default_min_history")]
    pub min_history: usize,
    /// Most recent history records used for training
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Heuristic wait per waiting entry (minutes)
    #[serde(default = "default_heuristic_unit_minutes")]
    pub heuristic_unit_minutes: u32,
    /// Floor for every estimate (minutes)
    #[serde(default = "default_min_estimate_minutes")]
    pub min_estimate_minutes: u32,
    /// Average service time used before any served history exists (minutes)
    #[serde(default = "default_service_minutes")]
    pub default_service_minutes: f64,
}

fn default_min_history() -> usize {
    5
}

fn default_history_window() -> usize {
    50
}

fn default_heuristic_unit_minutes() -> u32 {
    15
}

fn default_min_estimate_minutes() -> u32 {
    5
}

fn default_service_minutes() -> f64 {
    15.0
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_history: default_min_history(),
            history_window: default_history_window(),
            heuristic_unit_minutes: default_heuristic_unit_minutes(),
            min_estimate_minutes: default_min_estimate_minutes(),
            default_service_minutes: default_service_minutes(),
        }
    }
}

/// Priority ranker weights
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RankerConfig {
    /// Score per minute waited
    #[serde(default = "default_wait_weight")]
    pub wait_weight: f64,
    /// Parties strictly larger than this get `large_party_bonus`
    #[serde(default = "default_large_party_threshold")]
    pub large_party_threshold: u32,
    #[serde(default = "default_large_party_bonus")]
    pub large_party_bonus: f64,
    /// Parties strictly larger than this (and not large) get `medium_party_bonus`
    #[serde(default = "default_medium_party_threshold")]
    pub medium_party_threshold: u32,
    #[serde(default = "default_medium_party_bonus")]
    pub medium_party_bonus: f64,
}

fn default_wait_weight() -> f64 {
    0.5
}

fn default_large_party_threshold() -> u32 {
    4
}

fn default_large_party_bonus() -> f64 {
    10.0
}

fn default_medium_party_threshold() -> u32 {
    2
}

fn default_medium_party_bonus() -> f64 {
    5.0
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            wait_weight: default_wait_weight(),
            large_party_threshold: default_large_party_threshold(),
            large_party_bonus: default_large_party_bonus(),
            medium_party_threshold: default_medium_party_threshold(),
            medium_party_bonus: default_medium_party_bonus(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceTypeToml {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub max_party_size: Option<u32>,
    #[serde(default)]
    pub locations: Option<Vec<String>>,
    #[serde(default)]
    pub priority_weight: Option<f64>,
    #[serde(default)]
    pub prediction_factor: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewsConfig {
    /// Size of the "current" and "next" lists in snapshots
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Number of peak hours reported by analytics
    #[serde(default = "default_peak_hours")]
    pub peak_hours: usize,
    /// Trailing days covered by daily counts
    #[serde(default = "default_daily_window_days")]
    pub daily_window_days: u32,
    /// Seated capacity used for the capacity ratio
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u32,
    /// Check-ins are rejected once this many entries are waiting
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_peak_hours() -> usize {
    2
}

fn default_daily_window_days() -> u32 {
    7
}

fn default_max_capacity() -> u32 {
    50
}

fn default_max_queue_size() -> usize {
    50
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            peak_hours: default_peak_hours(),
            daily_window_days: default_daily_window_days(),
            max_capacity: default_max_capacity(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Bounded channel capacity for emitted events
    #[serde(default = "default_event_buffer")]
    pub buffer_size: usize,
    /// JSONL file the event journal appends to (empty to disable)
    #[serde(default = "default_journal_file")]
    pub journal_file: String,
}

fn default_event_buffer() -> usize {
    1000
}

fn default_journal_file() -> String {
    "queue_events.jsonl".to_string()
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { buffer_size: default_event_buffer(), journal_file: default_journal_file() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    60
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    /// Venue identifier included in logs
    #[serde(default = "default_venue_id")]
    pub id: String,
}

fn default_venue_id() -> String {
    "venue".to_string()
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self { id: default_venue_id() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub service_types: HashMap<String, ServiceTypeToml>,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub ranker: RankerConfig,
    #[serde(default)]
    pub views: ViewsConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    venue_id: String,
    services: ServiceTable,
    estimator: EstimatorConfig,
    ranker: RankerConfig,
    top_k: usize,
    peak_hours: usize,
    daily_window_days: u32,
    max_capacity: u32,
    max_queue_size: usize,
    event_buffer_size: usize,
    journal_file: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        let views = ViewsConfig::default();
        let events = EventsConfig::default();
        Self {
            venue_id: default_venue_id(),
            services: ServiceTable::default(),
            estimator: EstimatorConfig::default(),
            ranker: RankerConfig::default(),
            top_k: views.top_k,
            peak_hours: views.peak_hours,
            daily_window_days: views.daily_window_days,
            max_capacity: views.max_capacity,
            max_queue_size: views.max_queue_size,
            event_buffer_size: events.buffer_size,
            journal_file: events.journal_file,
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content).context("Failed to parse config")?;

        let mut services = ServiceTable::default();
        for (key, overrides) in toml_config.service_types {
            let service_type: ServiceType = key
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| format!("Invalid [service_types.{key}] section"))?;
            let target = services.get_mut(service_type);
            if let Some(name) = overrides.display_name {
                target.display_name = name;
            }
            if let Some(max) = overrides.max_party_size {
                target.max_party_size = max;
            }
            if let Some(locations) = overrides.locations {
                target.locations = locations;
            }
            if let Some(weight) = overrides.priority_weight {
                target.priority_weight = weight;
            }
            if let Some(factor) = overrides.prediction_factor {
                target.prediction_factor = factor;
            }
        }

        for service_type in ServiceType::ALL {
            let settings = services.get(service_type);
            if settings.max_party_size == 0 {
                bail!("service type {service_type} must allow a party size of at least 1");
            }
            if settings.locations.is_empty() {
                bail!("service type {service_type} must list at least one location");
            }
            ensure_finite(&format!("service_types.{service_type}.priority_weight"), settings.priority_weight)?;
            ensure_non_negative(
                &format!("service_types.{service_type}.prediction_factor"),
                settings.prediction_factor,
            )?;
        }

        let estimator = &toml_config.estimator;
        if estimator.history_window == 0 {
            bail!("estimator.history_window must be at least 1");
        }
        if estimator.min_estimate_minutes == 0 {
            bail!("estimator.min_estimate_minutes must be at least 1");
        }
        ensure_non_negative("estimator.default_service_minutes", estimator.default_service_minutes)?;

        let ranker = &toml_config.ranker;
        ensure_finite("ranker.wait_weight", ranker.wait_weight)?;
        ensure_finite("ranker.large_party_bonus", ranker.large_party_bonus)?;
        ensure_finite("ranker.medium_party_bonus", ranker.medium_party_bonus)?;

        let window = toml_config.views.daily_window_days;
        if window == 0 || window > MAX_DAILY_WINDOW_DAYS {
            bail!("views.daily_window_days must be between 1 and {MAX_DAILY_WINDOW_DAYS}, got {window}");
        }

        Ok(Self {
            venue_id: toml_config.venue.id,
            services,
            estimator: toml_config.estimator,
            ranker: toml_config.ranker,
            top_k: toml_config.views.top_k,
            peak_hours: toml_config.views.peak_hours,
            daily_window_days: toml_config.views.daily_window_days,
            max_capacity: toml_config.views.max_capacity,
            max_queue_size: toml_config.views.max_queue_size,
            event_buffer_size: toml_config.events.buffer_size,
            journal_file: toml_config.events.journal_file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: "inline".to_string(),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to load config file {}", path.display()))?;
        config.config_file = path.display().to_string();
        Ok(config)
    }

    /// Load configuration from a path, falling back to defaults on error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), path = %path, "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn venue_id(&self) -> &str {
        &self.venue_id
    }

    pub fn services(&self) -> &ServiceTable {
        &self.services
    }

    pub fn service(&self, service_type: ServiceType) -> &ServiceTypeConfig {
        self.services.get(service_type)
    }

    pub fn estimator(&self) -> EstimatorConfig {
        self.estimator
    }

    pub fn ranker(&self) -> RankerConfig {
        self.ranker
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn peak_hours(&self) -> usize {
        self.peak_hours
    }

    pub fn daily_window_days(&self) -> u32 {
        self.daily_window_days
    }

    pub fn max_capacity(&self) -> u32 {
        self.max_capacity
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    pub fn event_buffer_size(&self) -> usize {
        self.event_buffer_size
    }

    pub fn journal_file(&self) -> &str {
        &self.journal_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to cap the waiting queue
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

}

fn ensure_finite(key: &str, value: f64) -> anyhow::Result<()> {
    if !value.is_finite() {
        bail!("{key} must be a finite number, got {value}");
    }
    Ok(())
}

fn ensure_non_negative(key: &str, value: f64) -> anyhow::Result<()> {
    ensure_finite(key, value)?;
    if value < 0.0 {
        bail!("{key} must not be negative, got {value}");
    }
    Ok(())
}

//! Integration tests for configuration loading

use std::io::Write;
use tempfile::NamedTempFile;
use venue_queue::domain::ServiceType;
use venue_queue::infra::Config;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[venue]
id = "harbour-grill"

[service_types.dine-in]
display_name = "Dining Room"
max_party_size = 12
locations = ["Main Dining", "Terrace"]
priority_weight = 6.0

[estimator]
min_history = 10
history_window = 30

[ranker]
wait_weight = 0.75

[views]
top_k = 3
max_capacity = 40
max_queue_size = 25

[events]
buffer_size = 64
journal_file = "/tmp/harbour/events.jsonl"

[metrics]
interval_secs = 15
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.venue_id(), "harbour-grill");
    let dine_in = config.service(ServiceType::DineIn);
    assert_eq!(dine_in.display_name, "Dining Room");
    assert_eq!(dine_in.max_party_size, 12);
    assert!(dine_in.allows_location("Terrace"));
    assert!(!dine_in.allows_location("Outdoor"));
    assert_eq!(dine_in.priority_weight, 6.0);
    // Untouched field keeps its default
    assert_eq!(dine_in.prediction_factor, 1.1);

    assert_eq!(config.estimator().min_history, 10);
    assert_eq!(config.estimator().history_window, 30);
    assert_eq!(config.estimator().heuristic_unit_minutes, 15);
    assert_eq!(config.ranker().wait_weight, 0.75);
    assert_eq!(config.ranker().large_party_bonus, 10.0);
    assert_eq!(config.top_k(), 3);
    assert_eq!(config.peak_hours(), 2);
    assert_eq!(config.max_capacity(), 40);
    assert_eq!(config.max_queue_size(), 25);
    assert_eq!(config.event_buffer_size(), 64);
    assert_eq!(config.journal_file(), "/tmp/harbour/events.jsonl");
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_invalid_config_is_an_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[estimator]\nhistory_window = 0\n").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("history_window"));
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.config_file(), "default");
    assert_eq!(config.service(ServiceType::Takeout).max_party_size, 10);
    assert_eq!(config.estimator().min_history, 5);
    assert_eq!(config.max_queue_size(), 50);
}

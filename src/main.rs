//! Venue queue - walk-in queue ranking and wait-time estimation
//!
//! Hosts a `QueueEngine`, journals its events to a JSONL file and logs
//! periodic metrics until Ctrl+C.
//!
//! Module structure:
//! - `domain/` - Core types (QueueEntry, history records, events, errors)
//! - `services/` - Store, estimator, ranker, analytics, engine
//! - `io/` - Event channel and journal
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use venue_queue::domain::{CheckInRequest, EntryStatus};
use venue_queue::infra::{Config, Metrics};
use venue_queue::io::{create_event_channel, EventJournal};
use venue_queue::services::QueueEngine;

/// Venue queue - walk-in queue service
#[derive(Parser, Debug)]
#[command(name = "venue-queue", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Check in a few demo customers at startup
    #[arg(long)]
    seed_demo: bool,

    /// Override the metrics report interval from the config file
    #[arg(long)]
    report_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("venue-queue starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        venue = %config.venue_id(),
        min_history = %config.estimator().min_history,
        history_window = %config.estimator().history_window,
        top_k = %config.top_k(),
        max_queue_size = %config.max_queue_size(),
        journal_file = %config.journal_file(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    let mut engine = QueueEngine::new(config.clone(), metrics.clone());

    // Journal is optional: an empty path disables it
    let journal_handle = if config.journal_file().is_empty() {
        None
    } else {
        let (event_sender, event_rx) = create_event_channel(config.event_buffer_size(), metrics.clone());
        engine = engine.with_events(event_sender);
        let journal = EventJournal::new(config.journal_file(), event_rx);
        let journal_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move { journal.run(journal_shutdown).await }))
    };

    let engine = Arc::new(engine);

    if args.seed_demo {
        seed_demo(&engine).await.context("Failed to seed demo entries")?;

        let snapshot = serde_json::to_string(&engine.snapshot()).context("Failed to encode snapshot")?;
        info!(snapshot = %snapshot, "queue_snapshot");
        let analytics =
            serde_json::to_string(&engine.analytics_snapshot()).context("Failed to encode analytics")?;
        info!(analytics = %analytics, "analytics_snapshot");
    }

    // Periodic metrics report
    let report_secs = args.report_interval_secs.unwrap_or(config.metrics_interval_secs()).max(1);
    let report_engine = engine.clone();
    let mut report_shutdown = shutdown_rx.clone();
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(report_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => report_engine.metrics_report().log(),
                changed = report_shutdown.changed() => {
                    if changed.is_err() || *report_shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    });

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
    info!("shutdown_signal_received");
    if shutdown_tx.send(true).is_err() {
        warn!("shutdown_receivers_gone");
    }

    if let Err(e) = reporter.await {
        error!(error = %e, "metrics_reporter_failed");
    }
    if let Some(handle) = journal_handle {
        match handle.await {
            Ok(written) => info!(written = %written, "event_journal_flushed"),
            Err(e) => error!(error = %e, "event_journal_failed"),
        }
    }
    engine.metrics_report().log();

    info!("venue-queue shutdown complete");
    Ok(())
}

/// Demo customers: two waiting dine-in parties and one seated takeout
async fn seed_demo(engine: &QueueEngine) -> anyhow::Result<()> {
    let now = Utc::now();

    let jane = engine
        .check_in_at(
            CheckInRequest::new("Jane Smith", 2, "takeout", "Takeout Counter").with_phone("555-0102"),
            now - Duration::minutes(45),
        )
        .await?;
    engine
        .check_in_at(
            CheckInRequest::new("John Doe", 4, "dine-in", "Main Dining").with_phone("555-0101"),
            now - Duration::minutes(30),
        )
        .await?;
    engine
        .check_in_at(
            CheckInRequest::new("Bob Wilson", 6, "dine-in", "Outdoor").with_phone("555-0103"),
            now - Duration::minutes(15),
        )
        .await?;

    engine.update_status_at(jane.entry.id, EntryStatus::Seated, None, now)?;

    info!(entries = %engine.entries(None).len(), "demo_seeded");
    Ok(())
}

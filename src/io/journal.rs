//! Event journal - appends queue events to a JSONL file
//!
//! One JSON object per line, in the order events were received from the
//! channel.

use crate::domain::events::QueueEvent;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Consumer of the event channel
pub struct EventJournal {
    file_path: PathBuf,
    rx: mpsc::Receiver<QueueEvent>,
    written: u64,
}

impl EventJournal {
    pub fn new<P: AsRef<Path>>(file_path: P, rx: mpsc::Receiver<QueueEvent>) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        info!(file_path = %file_path.display(), "event_journal_initialized");
        Self { file_path, rx, written: 0 }
    }

    /// Run until shutdown is signalled or every sender is dropped.
    ///
    /// Events still buffered at shutdown are written before returning.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        while let Ok(event) = self.rx.try_recv() {
                            self.write_event(&event);
                        }
                        info!(written = %self.written, "event_journal_shutdown");
                        return self.written;
                    }
                }
                maybe_event = self.rx.recv() => {
                    match maybe_event {
                        Some(event) => self.write_event(&event),
                        None => {
                            info!(written = %self.written, "event_journal_closed");
                            return self.written;
                        }
                    }
                }
            }
        }
    }

    fn write_event(&mut self, event: &QueueEvent) {
        match append_line(&self.file_path, &event.to_json()) {
            Ok(()) => {
                self.written += 1;
                debug!(event = %event.as_str(), entry_id = %event.entry_id(), "event_journaled");
            }
            Err(e) => {
                error!(
                    event = %event.as_str(),
                    entry_id = %event.entry_id(),
                    error = %e,
                    "event_journal_write_failed"
                );
            }
        }
    }
}

/// Append one line, creating the file and its parent directories as needed
fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{EntryId, EntryStatus};
    use std::fs;
    use tempfile::tempdir;

    fn removed(id: u64) -> QueueEvent {
        QueueEvent::EntryRemoved { entry_id: EntryId(id) }
    }

    #[tokio::test]
    async fn test_writes_until_senders_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(removed(1)).await.unwrap();
        tx.send(QueueEvent::StatusChanged {
            entry_id: EntryId(2),
            old_status: EntryStatus::Waiting,
            new_status: EntryStatus::Served,
        })
        .await
        .unwrap();
        drop(tx);

        let written = EventJournal::new(&path, rx).run(shutdown_rx).await;
        assert_eq!(written, 2);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["type"], "entry_removed");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["new_status"], "served");
    }

    #[tokio::test]
    async fn test_shutdown_drains_buffered_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("dir").join("events.jsonl");
        let (tx, rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        for id in 0..3 {
            tx.send(removed(id)).await.unwrap();
        }
        shutdown_tx.send(true).unwrap();

        let written = EventJournal::new(&path, rx).run(shutdown_rx).await;
        assert_eq!(written, 3);
        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 3);
        drop(tx);
    }

    #[test]
    fn test_append_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        append_line(&path, "{\"a\":1}").unwrap();
        append_line(&path, "{\"a\":2}").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"a\":1}\n{\"a\":2}\n");
    }
}

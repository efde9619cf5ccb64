//! Status and result sinks.
//!
//! Status is a human-readable, last-write-wins string stream. Results are
//! `(text, prompt, label)` tuples handed to whatever records them (history).

use tokio::sync::watch;
use tracing::debug;

use crate::types::{BackendKind, ProcessingResult};

/// Receives coarse status transitions ("Relay Server: Stopped", ...).
pub trait StatusSink: Send + Sync {
    fn update(&self, status: &str);
}

/// Receives completed results that should be shown or recorded.
pub trait ResultSink: Send + Sync {
    fn deliver(&self, result: &ProcessingResult);
}

/// Status sink backed by a `watch` channel: readers only ever see the latest value.
#[derive(Clone)]
pub struct WatchStatus {
    tx: watch::Sender<String>,
}

impl WatchStatus {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(String::new());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> String {
        self.tx.borrow().clone()
    }
}

impl Default for WatchStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for WatchStatus {
    fn update(&self, status: &str) {
        debug!(status = %status, "Status update");
        // send_replace never fails, even with no receivers.
        self.tx.send_replace(status.to_string());
    }
}

/// Result sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResultSink;

impl ResultSink for NullResultSink {
    fn deliver(&self, _result: &ProcessingResult) {}
}

/// Text for the status surface: active backend, then the last relay status if any.
pub fn compose_status(active: BackendKind, relay_status: &str) -> String {
    if relay_status.is_empty() {
        active.display_name().to_string()
    } else {
        format!("{} | {}", active.display_name(), relay_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_status_keeps_last_write() {
        let status = WatchStatus::new();
        let rx = status.subscribe();
        status.update("first");
        status.update("second");
        assert_eq!(status.latest(), "second");
        assert_eq!(*rx.borrow(), "second");
    }

    #[test]
    fn compose_status_joins_relay_state() {
        assert_eq!(compose_status(BackendKind::Local, ""), "Local");
        assert_eq!(
            compose_status(BackendKind::Cloud, "Relay Server: Stopped"),
            "Cloud (Google Gemini) | Relay Server: Stopped"
        );
    }
}

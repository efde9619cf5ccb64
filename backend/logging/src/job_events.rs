//! Job Event Logger
//!
//! One structured record per processing job, under the `job_events` target
//! so the NDJSON file can be filtered for them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

/// Where a job came from.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    Local,
    Relay,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Submitted {
        source: JobSource,
        image_bytes: usize,
    },
    Completed {
        chars: usize,
        elapsed_ms: u128,
    },
    Failed {
        error_msg: String,
    },
}

#[derive(Debug, Serialize)]
pub struct JobEventEntry {
    pub backend: String,
    pub timestamp: DateTime<Utc>,
    pub event: JobEvent,
}

pub struct JobEventLogger;

impl JobEventLogger {
    /// Emit a job event; error text is redacted first.
    pub fn log_event(backend: &str, event: JobEvent) -> JobEventEntry {
        let event = match event {
            JobEvent::Failed { error_msg } => JobEvent::Failed {
                error_msg: redact_sensitive_data(&error_msg),
            },
            other => other,
        };

        let entry = JobEventEntry {
            backend: backend.to_string(),
            timestamp: Utc::now(),
            event,
        };

        match serde_json::to_string(&entry) {
            Ok(json) => info!(target: "job_events", event = %json, "Job event"),
            Err(_) => info!(target: "job_events", event = ?entry, "Job event"),
        }
        entry
    }
}

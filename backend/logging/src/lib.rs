//! Structured logging for VisionGrab.
//!
//! Console plus rolling NDJSON file output, secret redaction, and job events.

pub mod job_events;
pub mod logger;
pub mod redact;

pub use job_events::{JobEvent, JobEventEntry, JobEventLogger, JobSource};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;

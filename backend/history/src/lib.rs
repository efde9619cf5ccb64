//! `visiongrab-history` — record of every completed job, newest first.

pub mod store;

pub use store::{HistoryEntry, HistoryStore};

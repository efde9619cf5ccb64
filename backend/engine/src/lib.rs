//! `visiongrab-engine` — owns the local llama-server process.
//!
//! A single [`EngineManager`] per application starts, stops and tracks the
//! engine. Process creation goes through [`EngineLauncher`] so tests can
//! substitute an in-process fake.

pub mod config;
pub mod error;
pub mod health;
pub mod manager;
pub mod process;

pub use config::EngineConfig;
pub use error::EngineError;
pub use health::{health_check, wait_for_ready};
pub use manager::{EngineManager, EngineState, DEFAULT_GRACE_PERIOD};
pub use process::{EngineHandle, EngineLauncher, ProcessLauncher};

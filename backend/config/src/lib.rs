//! `visiongrab-config` — VisionGrab settings management.
//!
//! Provides:
//! - Typed settings schema shared by every backend
//! - YAML read/write with atomic backup rotation
//! - `${ENV_VAR}` substitution
//! - Redaction for safe logging/display
//! - Default value application
//! - Validation with field paths

pub mod defaults;
pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, load_settings, settings_file_path, write_settings};
pub use redact::{collect_redacted_paths, redact, redact_settings};
pub use schema::{
    parse_port, shared, AppSettings, CloudSettings, LocalEngineSettings, PortSetting,
    RelaySettings, RemoteEngineSettings, SharedSettings,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

/// Load settings, substitute env vars, apply defaults and log validation findings.
///
/// This is the main entry point for loading settings at runtime.
pub async fn load_and_prepare(path: &Path) -> Result<AppSettings> {
    let raw = load_settings(path).await?;

    let value: Value =
        serde_json::to_value(&raw).context("Failed to serialize settings for processing")?;
    let value = resolve_env_vars(&value).context("Failed to resolve env vars in settings")?;

    let settings: AppSettings = serde_json::from_value(value)
        .context("Failed to deserialize settings after processing")?;
    let settings = apply_all_defaults(settings);

    let report = validate(&settings);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Settings warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Settings error");
    }

    Ok(settings)
}

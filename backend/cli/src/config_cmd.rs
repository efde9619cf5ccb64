//! `visiongrab config`: inspect and edit the settings file.

use std::path::Path;

use anyhow::{bail, Result};
use clap::Subcommand;
use visiongrab_config::{
    load_settings, redact_settings, settings_file_path, validate, write_settings, AppSettings,
};
use visiongrab_core::BackendKind;

use crate::terminal_output::{note_error, note_success, note_warn};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print effective settings with secrets masked
    Show,
    /// Report settings errors and warnings
    Validate,
    /// Print the settings file location
    Path,
    /// Write a settings file with defaults if none exists
    Init,
    /// Change defaultBackend
    SetBackend { backend: BackendKind },
}

/// `settings` is the prepared (defaults applied, env resolved) view; edits go
/// through the raw file so `${VAR}` references are written back untouched.
pub async fn run(config_dir: &Path, settings: &AppSettings, cmd: ConfigCommands) -> Result<()> {
    let path = settings_file_path(config_dir);
    match cmd {
        ConfigCommands::Show => print!("{}", serde_yaml::to_string(&redact_settings(settings))?),
        ConfigCommands::Validate => {
            let report = validate(settings);
            for warning in &report.warnings {
                note_warn(&format!("{}: {}", warning.path, warning.message));
            }
            for error in &report.errors {
                note_error(&format!("{}: {}", error.path, error.message));
            }
            if !report.is_valid() {
                bail!("{} settings error(s) in {}", report.errors.len(), path.display());
            }
            note_success("Settings are valid");
        }
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::Init => {
            if path.exists() {
                note_warn(&format!("{} already exists", path.display()));
            } else {
                write_settings(&AppSettings::default(), &path).await?;
                note_success(&format!("Wrote {}", path.display()));
            }
        }
        ConfigCommands::SetBackend { backend } => {
            let mut raw = load_settings(&path).await?;
            raw.default_backend = backend.setting_value().to_string();
            write_settings(&raw, &path).await?;
            note_success(&format!("Default backend set to {}", backend.display_name()));
        }
    }
    Ok(())
}

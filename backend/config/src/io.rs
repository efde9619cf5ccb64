//! Settings file read/write with atomic backup rotation.

use crate::schema::AppSettings;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Default settings file name within the config directory.
const SETTINGS_FILE_NAME: &str = "settings.yaml";

/// Number of rolling backups to keep.
const MAX_BACKUPS: usize = 5;

/// Resolve the VisionGrab config directory.
/// Priority: `VISIONGRAB_CONFIG_DIR` env > `~/.visiongrab/`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("VISIONGRAB_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".visiongrab");
    }
    PathBuf::from(".visiongrab")
}

/// Resolve the full path to the settings file.
pub fn settings_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE_NAME)
}

/// Load and parse settings from disk.
///
/// Returns `Ok(Default::default())` if the file doesn't exist (first run).
pub async fn load_settings(path: &Path) -> Result<AppSettings> {
    if !path.exists() {
        debug!(path = %path.display(), "Settings file does not exist; using defaults");
        return Ok(AppSettings::default());
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

    if raw.trim().is_empty() {
        return Ok(AppSettings::default());
    }

    let settings: AppSettings = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse settings YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded settings");
    Ok(settings)
}

/// Write settings to disk atomically (write to temp file, rename).
///
/// Creates a rolling backup of the previous file before overwriting.
pub async fn write_settings(settings: &AppSettings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create config directory: {}", parent.display())
        })?;
    }

    if path.exists() {
        rotate_backups(path).await;
    }

    let yaml = serde_yaml::to_string(settings).context("Failed to serialize settings to YAML")?;

    let tmp_path = path.with_extension("yaml.tmp");
    fs::write(&tmp_path, yaml.as_bytes())
        .await
        .with_context(|| format!("Failed to write temp settings: {}", tmp_path.display()))?;

    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to rename temp settings to: {}", path.display()))?;

    info!(path = %path.display(), "Wrote settings");
    Ok(())
}

/// Rotate backup files: settings.yaml.bak.1 → .bak.2 → ... → .bak.N
async fn rotate_backups(path: &Path) {
    for i in (1..MAX_BACKUPS).rev() {
        let old = path.with_extension(format!("yaml.bak.{i}"));
        let new = path.with_extension(format!("yaml.bak.{}", i + 1));
        if old.exists() {
            if let Err(e) = fs::rename(&old, &new).await {
                warn!("Failed to rotate backup {}: {}", old.display(), e);
            }
        }
    }

    let bak = path.with_extension("yaml.bak.1");
    if let Err(e) = fs::copy(path, &bak).await {
        warn!("Failed to create backup {}: {}", bak.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(&dir.path().join("nope.yaml")).await.unwrap();
        assert_eq!(settings.default_backend, "Gemini");
    }

    #[tokio::test]
    async fn write_then_load_keeps_values_and_backs_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = settings_file_path(dir.path());

        let mut settings = AppSettings::default();
        settings.default_backend = "Local".to_string();
        write_settings(&settings, &path).await.unwrap();

        settings.relay.server_enabled = true;
        write_settings(&settings, &path).await.unwrap();

        let loaded = load_settings(&path).await.unwrap();
        assert_eq!(loaded.default_backend, "Local");
        assert!(loaded.relay.server_enabled);
        assert!(path.with_extension("yaml.bak.1").exists());
    }

    #[tokio::test]
    async fn malformed_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        tokio::fs::write(&path, "relay: [unclosed").await.unwrap();
        assert!(load_settings(&path).await.is_err());
    }
}

//! Composition root: every long-lived component is built here once and
//! shared through `Arc`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use visiongrab_config::{shared, AppSettings, SharedSettings};
use visiongrab_core::WatchStatus;
use visiongrab_engine::{EngineManager, ProcessLauncher};
use visiongrab_history::HistoryStore;
use visiongrab_providers::BackendRegistry;
use visiongrab_relay::{NetshFirewall, RelayServer};

pub struct App {
    pub settings: SharedSettings,
    pub status: Arc<WatchStatus>,
    pub history: Arc<HistoryStore>,
    pub registry: Arc<BackendRegistry>,
    pub relay: Arc<RelayServer>,
}

impl App {
    pub fn build(config_dir: &Path, settings: AppSettings) -> Result<Self> {
        let history_path = history_path(config_dir, &settings);
        let history = Arc::new(
            HistoryStore::open(&history_path)?.with_max_entries(settings.history.max_entries),
        );

        let settings = shared(settings);
        let status = Arc::new(WatchStatus::new());
        let engine = Arc::new(EngineManager::new(
            settings.clone(),
            Arc::new(ProcessLauncher),
            status.clone(),
        ));
        let registry = Arc::new(BackendRegistry::new(settings.clone(), engine));
        let relay = Arc::new(RelayServer::new(
            Arc::clone(&registry),
            settings.clone(),
            history.clone(),
            status.clone(),
            Arc::new(NetshFirewall::new()),
        ));

        info!(config_dir = %config_dir.display(), history = %history_path.display(), "VisionGrab initialised");
        Ok(Self {
            settings,
            status,
            history,
            registry,
            relay,
        })
    }
}

pub fn history_path(config_dir: &Path, settings: &AppSettings) -> PathBuf {
    settings
        .history
        .path
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir.join("history.db"))
}

pub fn log_dir(config_dir: &Path, settings: &AppSettings) -> PathBuf {
    settings
        .logging
        .dir
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir.join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_with_default_paths() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::build(dir.path(), AppSettings::default()).unwrap();
        assert!(dir.path().join("history.db").exists());
        assert_eq!(app.history.count().unwrap(), 0);
        assert!(!app.registry.engine().is_running().await);
    }

    #[test]
    fn custom_paths_override_defaults() {
        let mut settings = AppSettings::default();
        settings.history.path = Some("/data/vg.db".to_string());
        settings.logging.dir = Some("  ".to_string());
        let dir = Path::new("/home/u/.visiongrab");
        assert_eq!(history_path(dir, &settings), PathBuf::from("/data/vg.db"));
        assert_eq!(log_dir(dir, &settings), dir.join("logs"));
    }
}

//! Launch parameters derived from the settings at start time.

use visiongrab_config::LocalEngineSettings;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub executable: String,
    pub model: String,
    pub mmproj: String,
    pub host: String,
    pub port: u16,
    pub context_size: u32,
    pub extra_args: Vec<String>,
}

impl EngineConfig {
    pub fn from_settings(settings: &LocalEngineSettings) -> Result<Self, EngineError> {
        let executable = settings.executable_path.trim();
        if executable.is_empty() {
            return Err(EngineError::NotConfigured(
                "localEngine.executablePath is empty".to_string(),
            ));
        }
        let port = settings
            .port
            .number()
            .ok_or_else(|| EngineError::InvalidPort(settings.port.to_string()))?;

        Ok(Self {
            executable: executable.to_string(),
            model: settings.model_path.trim().to_string(),
            mmproj: settings.mmproj_path.trim().to_string(),
            host: settings.host.trim().to_string(),
            port,
            context_size: settings.context_size,
            extra_args: settings.extra_args.clone(),
        })
    }

    /// llama-server command line, without the executable.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if !self.model.is_empty() {
            args.push("-m".to_string());
            args.push(self.model.clone());
        }
        if !self.mmproj.is_empty() {
            args.push("--mmproj".to_string());
            args.push(self.mmproj.clone());
        }
        args.push("--host".to_string());
        args.push(self.host.clone());
        args.push("--port".to_string());
        args.push(self.port.to_string());
        args.push("-c".to_string());
        args.push(self.context_size.to_string());
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// File name of the executable, used to find strays.
    pub fn executable_name(&self) -> &str {
        std::path::Path::new(&self.executable)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.executable)
    }
}

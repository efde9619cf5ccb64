//! Settings validation with field paths and readable messages.

use crate::schema::AppSettings;
use thiserror::Error;
use visiongrab_core::BackendKind;

/// A settings problem at a given field path.
#[derive(Debug, Error)]
#[error("Settings validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// Errors and warnings found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate settings and return every error and warning.
pub fn validate(settings: &AppSettings) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_default_backend(settings, &mut report);
    validate_local_engine(settings, &mut report);
    validate_cloud(settings, &mut report);
    validate_addresses(settings, &mut report);
    validate_relay(settings, &mut report);
    if settings.request_timeout_secs == 0 {
        report.error("requestTimeoutSecs", "requestTimeoutSecs must be >= 1");
    }
    report
}

fn validate_default_backend(settings: &AppSettings, report: &mut ValidationReport) {
    let value = settings.default_backend.trim();
    let known = ["local", "gemini", "cloud", "remote", "relay"];
    if !known.contains(&value.to_ascii_lowercase().as_str()) {
        report.warn(
            "defaultBackend",
            format!("Unknown backend '{value}'; falling back to Gemini"),
        );
    }
}

/// The engine is needed whenever it can be started without an explicit selection.
fn validate_local_engine(settings: &AppSettings, report: &mut ValidationReport) {
    let engine = &settings.local_engine;
    if engine.port.number().is_none() {
        report.error(
            "localEngine.port",
            format!("'{}' is not a port in 1-65535", engine.port),
        );
    }

    let engine_needed = engine.start_on_startup
        || settings.relay.server_enabled
        || BackendKind::from_setting(&settings.default_backend) == BackendKind::Local;

    if engine.executable_path.trim().is_empty() {
        if engine_needed {
            report.error(
                "localEngine.executablePath",
                "llama-server path is required when the local engine is used",
            );
        }
        return;
    }
    if engine.model_path.trim().is_empty() {
        report.warn("localEngine.modelPath", "No model configured for the local engine");
    }
    if engine.mmproj_path.trim().is_empty() {
        report.warn(
            "localEngine.mmprojPath",
            "No multimodal projector configured; image input may be rejected",
        );
    }
}

fn validate_cloud(settings: &AppSettings, report: &mut ValidationReport) {
    let uses_cloud = BackendKind::from_setting(&settings.default_backend) == BackendKind::Cloud;
    if uses_cloud && settings.cloud.api_key.trim().is_empty() {
        report.warn("cloud.apiKey", "Gemini is the default backend but no API key is set");
    }
}

fn validate_addresses(settings: &AppSettings, report: &mut ValidationReport) {
    for (path, address) in [
        ("remoteEngine.address", &settings.remote_engine.address),
        ("relay.clientAddress", &settings.relay.client_address),
        ("cloud.baseUrl", &settings.cloud.base_url),
    ] {
        if !(address.starts_with("http://") || address.starts_with("https://")) {
            report.error(path, format!("'{address}' must start with http:// or https://"));
        }
    }
}

fn validate_relay(settings: &AppSettings, report: &mut ValidationReport) {
    let relay = &settings.relay;
    let Some(port) = relay.server_port.number() else {
        let message = format!("'{}' is not a port in 1-65535", relay.server_port);
        if relay.server_enabled {
            report.error("relay.serverPort", message);
        } else {
            report.warn("relay.serverPort", message);
        }
        return;
    };

    if Some(port) == settings.local_engine.port.number() {
        report.error(
            "relay.serverPort",
            format!("Port {port} is already used by the local engine"),
        );
    }
    if relay.server_enabled && port < 1024 {
        report.warn(
            "relay.serverPort",
            format!("Port {port} requires elevated privileges; consider using a port >= 1024"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PortSetting;

    #[test]
    fn default_settings_are_valid() {
        let report = validate(&AppSettings::default());
        assert!(report.is_valid(), "errors: {:?}", report.errors);
    }

    #[test]
    fn relay_without_engine_path_is_error() {
        let mut settings = AppSettings::default();
        settings.relay.server_enabled = true;
        let report = validate(&settings);
        assert!(report
            .errors
            .iter()
            .any(|e| e.path == "localEngine.executablePath"));
    }

    #[test]
    fn port_clash_is_error() {
        let mut settings = AppSettings::default();
        settings.relay.server_port = PortSetting::from("8081");
        let report = validate(&settings);
        assert!(report.errors.iter().any(|e| e.path == "relay.serverPort"));
    }

    #[test]
    fn bad_port_is_only_warning_while_relay_disabled() {
        let mut settings = AppSettings::default();
        settings.relay.server_port = PortSetting::from("99999");
        let report = validate(&settings);
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.path == "relay.serverPort"));
    }

    #[test]
    fn unknown_backend_warns() {
        let mut settings = AppSettings::default();
        settings.default_backend = "Ollama".to_string();
        let report = validate(&settings);
        assert!(report.warnings.iter().any(|w| w.path == "defaultBackend"));
    }
}

//! Fill blank settings with usable values after load.

use crate::schema::{AppSettings, PortSetting};
use visiongrab_core::DEFAULT_OCR_PROMPT;

pub const DEFAULT_LOCAL_ENGINE_PORT: &str = "8081";

pub const DEFAULT_RELAY_PORT: &str = "8082";

pub const DEFAULT_ENGINE_HOST: &str = "127.0.0.1";

pub const DEFAULT_CONTEXT_SIZE: u32 = 2048;

pub const DEFAULT_CLOUD_MODEL: &str = "gemini-2.0-flash-lite";

pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const DEFAULT_HISTORY_MAX_ENTRIES: u32 = 500;

/// Apply all defaults to freshly loaded settings.
pub fn apply_all_defaults(settings: AppSettings) -> AppSettings {
    let settings = apply_port_defaults(settings);
    let settings = apply_engine_defaults(settings);
    let settings = apply_address_defaults(settings);
    let settings = apply_prompt_defaults(settings);
    apply_logging_defaults(settings)
}

/// Blank ports get the stock ports. Invalid ones are left for validation to report.
fn apply_port_defaults(mut settings: AppSettings) -> AppSettings {
    if settings.local_engine.port.is_blank() {
        settings.local_engine.port = PortSetting::from(DEFAULT_LOCAL_ENGINE_PORT);
    }
    if settings.relay.server_port.is_blank() {
        settings.relay.server_port = PortSetting::from(DEFAULT_RELAY_PORT);
    }
    settings
}

fn apply_engine_defaults(mut settings: AppSettings) -> AppSettings {
    if settings.local_engine.context_size == 0 {
        settings.local_engine.context_size = DEFAULT_CONTEXT_SIZE;
    }
    if settings.local_engine.host.trim().is_empty() {
        settings.local_engine.host = DEFAULT_ENGINE_HOST.to_string();
    }
    if settings.cloud.model_id.trim().is_empty() {
        settings.cloud.model_id = DEFAULT_CLOUD_MODEL.to_string();
    }
    settings
}

/// Trim trailing slashes so backends can append paths directly.
fn apply_address_defaults(mut settings: AppSettings) -> AppSettings {
    for address in [
        &mut settings.remote_engine.address,
        &mut settings.relay.client_address,
        &mut settings.cloud.base_url,
    ] {
        let trimmed = address.trim().trim_end_matches('/').to_string();
        *address = trimmed;
    }
    settings
}

fn apply_prompt_defaults(mut settings: AppSettings) -> AppSettings {
    if settings.custom_prompt.trim().is_empty() {
        settings.custom_prompt = DEFAULT_OCR_PROMPT.to_string();
    }
    settings
}

fn apply_logging_defaults(mut settings: AppSettings) -> AppSettings {
    if settings.logging.level.is_none() {
        settings.logging.level = Some(DEFAULT_LOG_LEVEL.to_string());
    }
    if settings.history.max_entries.is_none() {
        settings.history.max_entries = Some(DEFAULT_HISTORY_MAX_ENTRIES);
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_ports_get_stock_values() {
        let mut settings = AppSettings::default();
        settings.relay.server_port = PortSetting::from("");
        let settings = apply_all_defaults(settings);
        assert_eq!(settings.relay.server_port.as_str(), DEFAULT_RELAY_PORT);
    }

    #[test]
    fn invalid_ports_are_not_overwritten() {
        let mut settings = AppSettings::default();
        settings.relay.server_port = PortSetting::from("eighty");
        let settings = apply_all_defaults(settings);
        assert_eq!(settings.relay.server_port.as_str(), "eighty");
    }

    #[test]
    fn trailing_slashes_are_trimmed() {
        let mut settings = AppSettings::default();
        settings.relay.client_address = "http://10.0.0.5:8082/".to_string();
        let settings = apply_all_defaults(settings);
        assert_eq!(settings.relay.client_address, "http://10.0.0.5:8082");
    }

    #[test]
    fn empty_prompt_restored() {
        let mut settings = AppSettings::default();
        settings.custom_prompt = "   ".to_string();
        let settings = apply_all_defaults(settings);
        assert_eq!(settings.custom_prompt, DEFAULT_OCR_PROMPT);
    }

    #[test]
    fn does_not_override_user_level() {
        let mut settings = AppSettings::default();
        settings.logging.level = Some("debug".to_string());
        let settings = apply_all_defaults(settings);
        assert_eq!(settings.logging.level.as_deref(), Some("debug"));
    }
}

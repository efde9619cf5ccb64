//! VisionGrab settings schema.
//!
//! Typed for serde YAML/JSON. Every section carries its own defaults so a
//! partial (or missing) settings file always deserializes.

use std::fmt;
use std::sync::Arc;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::RwLock;
use visiongrab_core::DEFAULT_OCR_PROMPT;

/// Settings shared between the registry, backends and relay server.
/// Readers take the lock per call so edits apply to the next job.
pub type SharedSettings = Arc<RwLock<AppSettings>>;

/// Wrap settings for sharing.
pub fn shared(settings: AppSettings) -> SharedSettings {
    Arc::new(RwLock::new(settings))
}

// ---------------------------------------------------------------------------
// Top-level settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    /// "Local", "Gemini", "Remote" or "Relay". Anything else means Gemini.
    pub default_backend: String,

    pub local_engine: LocalEngineSettings,

    pub cloud: CloudSettings,

    pub remote_engine: RemoteEngineSettings,

    pub relay: RelaySettings,

    /// Instruction sent with every local capture.
    pub custom_prompt: String,

    /// Per-request timeout for outbound backend calls.
    pub request_timeout_secs: u64,

    pub logging: LoggingSettings,

    pub history: HistorySettings,

    /// Set once the first-run setup has been completed.
    pub is_configured: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_backend: "Gemini".to_string(),
            local_engine: LocalEngineSettings::default(),
            cloud: CloudSettings::default(),
            remote_engine: RemoteEngineSettings::default(),
            relay: RelaySettings::default(),
            custom_prompt: DEFAULT_OCR_PROMPT.to_string(),
            request_timeout_secs: 120,
            logging: LoggingSettings::default(),
            history: HistorySettings::default(),
            is_configured: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Local engine (llama-server)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocalEngineSettings {
    /// Path to the llama-server executable.
    pub executable_path: String,
    /// GGUF model file.
    pub model_path: String,
    /// Multimodal projector file; empty when the model has none.
    pub mmproj_path: String,
    pub port: PortSetting,
    /// Bind address passed to the engine; `0.0.0.0` lets peers use it as a remote engine.
    pub host: String,
    pub context_size: u32,
    pub start_on_startup: bool,
    /// Extra command-line arguments appended verbatim.
    pub extra_args: Vec<String>,
    /// How long `process` waits for `/health` after launching the engine.
    pub startup_timeout_secs: u64,
}

impl Default for LocalEngineSettings {
    fn default() -> Self {
        Self {
            executable_path: String::new(),
            model_path: String::new(),
            mmproj_path: String::new(),
            port: PortSetting::from("8081"),
            host: "127.0.0.1".to_string(),
            context_size: 2048,
            start_on_startup: false,
            extra_args: Vec::new(),
            startup_timeout_secs: 120,
        }
    }
}

// ---------------------------------------------------------------------------
// Cloud (Gemini)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CloudSettings {
    pub model_id: String,
    /// May be written as `${GEMINI_API_KEY}` to keep the key out of the file.
    pub api_key: String,
    pub base_url: String,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            model_id: "gemini-2.0-flash-lite".to_string(),
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteEngineSettings {
    pub address: String,
}

impl Default for RemoteEngineSettings {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8081".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Relay server / client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelaySettings {
    pub server_enabled: bool,
    pub server_port: PortSetting,
    /// Forward relay results to the local result sink (history).
    pub display_results: bool,
    /// Peer used by the Relay backend.
    pub client_address: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            server_enabled: false,
            server_port: PortSetting::from("8082"),
            display_results: true,
            client_address: "http://127.0.0.1:8082".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging, History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Directory for the rolling NDJSON log; defaults to `<config dir>/logs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HistorySettings {
    /// SQLite file; defaults to `<config dir>/history.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Oldest entries beyond this count are pruned on insert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<u32>,
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// A TCP port as written in the settings file.
///
/// Older files store ports as strings, hand-edited ones usually as integers;
/// both are accepted and the raw text is kept so invalid values can be
/// reported rather than silently replaced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortSetting(String);

impl PortSetting {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The port number if it is an integer in `1..=65535`.
    pub fn number(&self) -> Option<u16> {
        parse_port(&self.0)
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Parse a port string, accepting only integers in `1..=65535`.
pub fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok().filter(|p| *p >= 1)
}

impl From<&str> for PortSetting {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

impl From<u16> for PortSetting {
    fn from(value: u16) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for PortSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for PortSetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PortSetting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PortVisitor;

        impl Visitor<'_> for PortVisitor {
            type Value = PortSetting;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a port number or string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<PortSetting, E> {
                Ok(PortSetting::from(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<PortSetting, E> {
                Ok(PortSetting(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<PortSetting, E> {
                Ok(PortSetting(v.to_string()))
            }
        }

        deserializer.deserialize_any(PortVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let settings: AppSettings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(settings.default_backend, "Gemini");
        assert_eq!(settings.relay.server_port.as_str(), "8082");
        assert!(settings.relay.display_results);
        assert_eq!(settings.local_engine.context_size, 2048);
    }

    #[test]
    fn port_accepts_string_or_integer() {
        let yaml = "relay:\n  serverPort: 9000\nlocalEngine:\n  port: \"8090\"\n";
        let settings: AppSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.relay.server_port.number(), Some(9000));
        assert_eq!(settings.local_engine.port.number(), Some(8090));
    }

    #[test]
    fn port_range_is_enforced() {
        assert_eq!(parse_port("0"), None);
        assert_eq!(parse_port("65535"), Some(65535));
        assert_eq!(parse_port("65536"), None);
        assert_eq!(parse_port("-1"), None);
        assert_eq!(parse_port("abc"), None);
        assert_eq!(parse_port(" 8082 "), Some(8082));
    }

    #[test]
    fn camel_case_keys_round_trip() {
        let mut settings = AppSettings::default();
        settings.relay.server_enabled = true;
        let yaml = serde_yaml::to_string(&settings).unwrap();
        assert!(yaml.contains("serverEnabled: true"));
        let back: AppSettings = serde_yaml::from_str(&yaml).unwrap();
        assert!(back.relay.server_enabled);
    }
}

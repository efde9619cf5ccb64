use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Instruction used when neither the caller nor the settings supply one.
pub const DEFAULT_OCR_PROMPT: &str = "OCR this image. Format inline equations with single $ signs and display equations with double $$ signs. Use HTML for tables. Return only the content.";

/// One image + instruction request, whether it came from a local capture or a relay peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    /// Base64-encoded image payload.
    pub image: String,
    pub instruction: String,
}

impl ProcessingJob {
    pub fn new(image: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            instruction: instruction.into(),
        }
    }

    /// Replace an empty instruction with `fallback`, then with [`DEFAULT_OCR_PROMPT`].
    pub fn with_default_instruction(mut self, fallback: &str) -> Self {
        if self.instruction.trim().is_empty() {
            self.instruction = if fallback.trim().is_empty() {
                DEFAULT_OCR_PROMPT.to_string()
            } else {
                fallback.to_string()
            };
        }
        self
    }
}

/// A finished job handed to the result sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub text: String,
    pub prompt: String,
    /// Which backend (or origin) produced the text.
    pub label: String,
    pub completed_at: DateTime<Utc>,
}

impl ProcessingResult {
    pub fn new(text: impl Into<String>, prompt: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prompt: prompt.into(),
            label: label.into(),
            completed_at: Utc::now(),
        }
    }
}

/// The four interchangeable backend variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// llama-server managed by this process on loopback.
    Local,
    /// Google Gemini over the public network.
    Cloud,
    /// llama-server hosted on another machine.
    Remote,
    /// Another VisionGrab instance running the relay server.
    Relay,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [Self::Local, Self::Cloud, Self::Remote, Self::Relay];

    /// Label recorded in history entries.
    pub fn label(self) -> &'static str {
        match self {
            Self::Local => "Llama",
            Self::Cloud => "Gemini",
            Self::Remote => "Remote",
            Self::Relay => "Relay",
        }
    }

    /// Longer name shown on the status surface.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Local => "Local",
            Self::Cloud => "Cloud (Google Gemini)",
            Self::Remote => "Networked llama-server",
            Self::Relay => "Networked VisionGrab Server",
        }
    }

    /// Resolve the `defaultBackend` setting.
    ///
    /// Unknown or empty values fall back to [`BackendKind::Cloud`].
    pub fn from_setting(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Self::Local,
            "remote" => Self::Remote,
            "relay" => Self::Relay,
            _ => Self::Cloud,
        }
    }

    /// Value written back to the `defaultBackend` setting.
    pub fn setting_value(self) -> &'static str {
        match self {
            Self::Local => "Local",
            Self::Cloud => "Gemini",
            Self::Remote => "Remote",
            Self::Relay => "Relay",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
#[error("unknown backend '{0}' (expected local, cloud, remote or relay)")]
pub struct ParseBackendKindError(String);

/// Strict parsing for explicit selections (CLI flags); unlike
/// [`BackendKind::from_setting`] there is no silent fallback.
impl FromStr for BackendKind {
    type Err = ParseBackendKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "llama" => Ok(Self::Local),
            "cloud" | "gemini" => Ok(Self::Cloud),
            "remote" => Ok(Self::Remote),
            "relay" => Ok(Self::Relay),
            other => Err(ParseBackendKindError(other.to_string())),
        }
    }
}

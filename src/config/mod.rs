//! Configuration loading and defaults.

pub mod paths;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use paths::get_data_dir;

/// Shape of voiceloop_config.json. Every field is optional in the file;
/// missing fields take the defaults below, which match the stock tuning of
/// the turn loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Turn exchange endpoint.
    pub backend_url: String,
    /// Named input device; `None` uses the system default.
    pub input_device: Option<String>,
    /// Loudness below this counts as silence.
    pub silence_threshold: f32,
    /// How long loudness must stay below the threshold to end an utterance.
    pub silence_duration_ms: u64,
    /// Cadence of the level meter while recording.
    pub level_poll_ms: u64,
    /// Pause before listening again after a reply with no audio.
    pub reply_grace_ms: u64,
    /// Pause before listening again after a failed exchange.
    pub error_grace_ms: u64,
    /// Upper bound on one backend exchange.
    pub request_timeout_secs: u64,
    /// Reply playback volume (1.0 = unity).
    pub playback_volume: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5000/api/transcribe-and-chat".to_string(),
            input_device: None,
            silence_threshold: 0.03,
            silence_duration_ms: 2000,
            level_poll_ms: 100,
            reply_grace_ms: 1000,
            error_grace_ms: 2000,
            request_timeout_secs: 60,
            playback_volume: 1.0,
        }
    }
}

impl AppConfig {
    pub fn silence_duration(&self) -> Duration {
        Duration::from_millis(self.silence_duration_ms)
    }

    pub fn level_poll(&self) -> Duration {
        Duration::from_millis(self.level_poll_ms)
    }

    pub fn reply_grace(&self) -> Duration {
        Duration::from_millis(self.reply_grace_ms)
    }

    pub fn error_grace(&self) -> Duration {
        Duration::from_millis(self.error_grace_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Read voiceloop_config.json from the data directory, falling back to
/// defaults when the file is missing or unreadable.
pub fn load() -> AppConfig {
    read_json_file(&config_path()).unwrap_or_default()
}

/// Path to voiceloop_config.json.
pub fn config_path() -> PathBuf {
    get_data_dir().join("voiceloop_config.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}

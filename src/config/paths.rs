//! Platform data directory for config and the run log.

use std::path::PathBuf;

/// Directory holding voiceloop_config.json and voiceloop.log.
///
/// Windows: %APPDATA%\voiceloop, macOS: ~/Library/Application Support/voiceloop,
/// Linux: $XDG_CONFIG_HOME/voiceloop (default ~/.config/voiceloop).
pub fn get_data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        })
        .join("voiceloop")
}

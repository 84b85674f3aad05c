//! Observer protocol: JSON-line events out, commands in.
//!
//! Events use `{"event": "<name>", "data": {...}}` on stdout; commands use
//! `{"command": "<name>"}` on stdin. The renderer consuming the events is a
//! pure observer: nothing it displays feeds back into the state machine.
//! Only user commands do.

pub mod bridge;

use serde::{Deserialize, Serialize};

/// All events emitted on stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum UiEvent {
    Starting {},
    Ready {},
    SessionStarted { session_id: String },
    Listening {},
    RecordingStop {},
    Uploading {},
    Transcription { user: String, translated: String },
    Reply { text: String },
    SpeakingStart {},
    SpeakingEnd {},
    Status { message: String },
    Error { message: String },
    SessionStopped {},
    Pong {},
    Stopping {},
}

/// All commands received on stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum UiCommand {
    /// Begin a hands-free session (mic button on).
    Start {},
    /// End the current utterance now instead of waiting for silence.
    Finish {},
    /// End the session (mic button off).
    Stop {},
    /// Exit the process.
    Quit {},
    Ping {},
}

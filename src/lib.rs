//! Voiceloop: hands-free voice conversation client.
//!
//! Captures microphone audio, detects end of utterance by silence, sends
//! the recording to a conversational backend, plays the synthesized reply,
//! and loops until the user stops the session. The heart of the crate is
//! the [`controller::TurnController`] state machine; everything else is a
//! collaborator it drives through effects.

pub mod audio;
pub mod backend;
pub mod config;
pub mod controller;
pub mod ipc;
pub mod playback;
pub mod session;
pub mod transcript;
pub mod vad;

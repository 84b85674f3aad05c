//! Turn controller: the conversation state machine.
//!
//! Five states sequence one hands-free conversation:
//!
//! ```text
//! Idle/Stopped --start--> Listening --utterance--> Uploading --reply audio--> Speaking
//!       ^                     ^                        |                         |
//!       |                     +----- grace delay ------+                         |
//!       +----- stop ----------+<---------------- playback finished -------------+
//! ```
//!
//! Every transition is a pure function of (current state, event) returning
//! the effects the driver must execute; the controller itself does no I/O.
//! Task-sourced events carry the epoch of the session that spawned them,
//! and anything arriving from a superseded session is dropped, so a late
//! backend response or playback signal can never restart listening after
//! the user has stopped.

pub mod driver;

use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::backend::{BackendError, TurnResult};
use crate::ipc::UiEvent;
use crate::transcript::{ConversationLog, Role};

/// Conversation states. At most one of Listening/Uploading/Speaking holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Never started.
    Idle,
    /// Mic held open, waiting for the utterance to end.
    Listening,
    /// Exchange in flight, or waiting out a grace delay before resuming.
    Uploading,
    /// Reply audio playing.
    Speaking,
    /// Session ended by the user or a device failure; restartable.
    Stopped,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Listening => write!(f, "listening"),
            Self::Uploading => write!(f, "uploading"),
            Self::Speaking => write!(f, "speaking"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Everything that can drive a transition.
#[derive(Debug)]
pub enum Event {
    /// User turned the session on.
    StartPressed,
    /// User ended the current utterance without waiting for silence.
    FinishPressed,
    /// User turned the session off.
    StopPressed,
    /// Capture session finalized a payload (silence or manual finish).
    UtteranceCaptured { epoch: u64, payload: Vec<u8> },
    /// Microphone could not be acquired or died.
    CaptureFailed { epoch: u64, message: String },
    /// Backend exchange landed.
    BackendCompleted {
        epoch: u64,
        result: Result<TurnResult, BackendError>,
    },
    /// Reply audio ran out (or failed; the error rides along).
    PlaybackFinished { epoch: u64, error: Option<String> },
    /// Post-turn grace delay elapsed.
    ResumeElapsed { epoch: u64 },
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Self::StartPressed => "start_pressed",
            Self::FinishPressed => "finish_pressed",
            Self::StopPressed => "stop_pressed",
            Self::UtteranceCaptured { .. } => "utterance_captured",
            Self::CaptureFailed { .. } => "capture_failed",
            Self::BackendCompleted { .. } => "backend_completed",
            Self::PlaybackFinished { .. } => "playback_finished",
            Self::ResumeElapsed { .. } => "resume_elapsed",
        }
    }
}

/// Instructions for the driver. Transitions return these instead of doing
/// I/O themselves.
#[derive(Debug, PartialEq)]
pub enum Effect {
    /// Spawn a fresh capture session (the mic is never pooled across turns).
    StartCapture { epoch: u64 },
    /// Ask the active capture to finalize and hand its payload off.
    FinishCapture,
    /// Ask the active capture to finalize and discard.
    AbortCapture,
    /// Send the payload to the backend.
    Upload { epoch: u64, payload: Vec<u8> },
    /// Play reply audio.
    Play { epoch: u64, audio: Vec<u8> },
    /// Deliver `ResumeElapsed` after the delay.
    ScheduleResume { epoch: u64, delay: Duration },
    /// Surface an event to the observer.
    Emit(UiEvent),
}

/// Grace delays applied before auto-resuming after a turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnTiming {
    /// Pause after a reply that carried no audio.
    pub reply_grace: Duration,
    /// Pause after a failed exchange.
    pub error_grace: Duration,
}

impl Default for TurnTiming {
    fn default() -> Self {
        Self {
            reply_grace: Duration::from_millis(1000),
            error_grace: Duration::from_millis(2000),
        }
    }
}

pub struct TurnController {
    state: TurnState,
    epoch: u64,
    timing: TurnTiming,
    log: ConversationLog,
}

impl TurnController {
    pub fn new(timing: TurnTiming) -> Self {
        Self {
            state: TurnState::Idle,
            epoch: 0,
            timing,
            log: ConversationLog::new(),
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Epoch of the current session. Bumped on every start and stop; task
    /// events carrying an older value are stale.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Apply one event. Returns the effects to execute, in order.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::StartPressed => self.on_start(),
            Event::FinishPressed => self.on_finish(),
            Event::StopPressed => self.on_stop(),
            Event::UtteranceCaptured { epoch, payload } if epoch == self.epoch => {
                self.on_captured(payload)
            }
            Event::CaptureFailed { epoch, message } if epoch == self.epoch => {
                self.on_capture_failed(message)
            }
            Event::BackendCompleted { epoch, result } if epoch == self.epoch => {
                self.on_backend(result)
            }
            Event::PlaybackFinished { epoch, error } if epoch == self.epoch => {
                self.on_playback_finished(error)
            }
            Event::ResumeElapsed { epoch } if epoch == self.epoch => self.on_resume(),
            stale => {
                debug!(event = stale.name(), state = %self.state, "Dropping stale event");
                Vec::new()
            }
        }
    }

    fn on_start(&mut self) -> Vec<Effect> {
        match self.state {
            TurnState::Idle | TurnState::Stopped => {
                self.epoch += 1;
                self.state = TurnState::Listening;
                vec![
                    Effect::Emit(UiEvent::SessionStarted {
                        session_id: Uuid::new_v4().to_string(),
                    }),
                    Effect::Emit(UiEvent::Listening {}),
                    Effect::Emit(UiEvent::Status {
                        message: "Listening...".to_string(),
                    }),
                    Effect::StartCapture { epoch: self.epoch },
                ]
            }
            _ => Vec::new(),
        }
    }

    fn on_finish(&mut self) -> Vec<Effect> {
        match self.state {
            TurnState::Listening => vec![Effect::FinishCapture],
            _ => Vec::new(),
        }
    }

    fn on_stop(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        match self.state {
            TurnState::Idle | TurnState::Stopped => return effects,
            TurnState::Listening => {
                // Release the mic; the aborted payload is never uploaded.
                effects.push(Effect::AbortCapture);
            }
            TurnState::Uploading | TurnState::Speaking => {
                // The in-flight request or playback is left to finish; the
                // epoch bump below makes its completion stale.
            }
        }
        self.state = TurnState::Stopped;
        self.epoch += 1;
        effects.push(Effect::Emit(UiEvent::SessionStopped {}));
        effects.push(Effect::Emit(UiEvent::Status {
            message: "Stopped".to_string(),
        }));
        effects
    }

    fn on_captured(&mut self, payload: Vec<u8>) -> Vec<Effect> {
        if self.state != TurnState::Listening {
            return Vec::new();
        }
        self.state = TurnState::Uploading;
        vec![
            Effect::Emit(UiEvent::RecordingStop {}),
            Effect::Emit(UiEvent::Uploading {}),
            Effect::Emit(UiEvent::Status {
                message: "Thinking...".to_string(),
            }),
            Effect::Upload {
                epoch: self.epoch,
                payload,
            },
        ]
    }

    fn on_capture_failed(&mut self, message: String) -> Vec<Effect> {
        // Device failures end the session; the user has to start over.
        self.state = TurnState::Stopped;
        self.epoch += 1;
        vec![
            Effect::Emit(UiEvent::Error { message }),
            Effect::Emit(UiEvent::SessionStopped {}),
            Effect::Emit(UiEvent::Status {
                message: "Stopped".to_string(),
            }),
        ]
    }

    fn on_backend(&mut self, result: Result<TurnResult, BackendError>) -> Vec<Effect> {
        if self.state != TurnState::Uploading {
            return Vec::new();
        }
        match result {
            Ok(turn) => {
                self.log.push(Role::User, turn.user_transcript.clone());
                self.log.push(Role::Assistant, turn.assistant_reply.clone());
                let mut effects = vec![
                    Effect::Emit(UiEvent::Transcription {
                        user: turn.user_transcript,
                        translated: turn.translated_transcript,
                    }),
                    Effect::Emit(UiEvent::Reply {
                        text: turn.assistant_reply,
                    }),
                ];
                match turn.reply_audio {
                    Some(audio) => {
                        self.state = TurnState::Speaking;
                        effects.push(Effect::Emit(UiEvent::SpeakingStart {}));
                        effects.push(Effect::Emit(UiEvent::Status {
                            message: "Speaking...".to_string(),
                        }));
                        effects.push(Effect::Play {
                            epoch: self.epoch,
                            audio,
                        });
                    }
                    None => {
                        // Nothing to play; take a breath, then listen again.
                        effects.push(Effect::ScheduleResume {
                            epoch: self.epoch,
                            delay: self.timing.reply_grace,
                        });
                    }
                }
                effects
            }
            Err(err) => {
                // The failed utterance is discarded; a fresh capture starts
                // after the grace delay.
                vec![
                    Effect::Emit(UiEvent::Error {
                        message: err.to_string(),
                    }),
                    Effect::ScheduleResume {
                        epoch: self.epoch,
                        delay: self.timing.error_grace,
                    },
                ]
            }
        }
    }

    fn on_playback_finished(&mut self, error: Option<String>) -> Vec<Effect> {
        if self.state != TurnState::Speaking {
            return Vec::new();
        }
        let mut effects = Vec::new();
        if let Some(message) = error {
            effects.push(Effect::Emit(UiEvent::Error { message }));
        }
        effects.push(Effect::Emit(UiEvent::SpeakingEnd {}));
        self.state = TurnState::Listening;
        effects.push(Effect::Emit(UiEvent::Listening {}));
        effects.push(Effect::Emit(UiEvent::Status {
            message: "Listening...".to_string(),
        }));
        effects.push(Effect::StartCapture { epoch: self.epoch });
        effects
    }

    fn on_resume(&mut self) -> Vec<Effect> {
        if self.state != TurnState::Uploading {
            return Vec::new();
        }
        self.state = TurnState::Listening;
        vec![
            Effect::Emit(UiEvent::Listening {}),
            Effect::Emit(UiEvent::Status {
                message: "Listening...".to_string(),
            }),
            Effect::StartCapture { epoch: self.epoch },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> TurnController {
        TurnController::new(TurnTiming::default())
    }

    fn started(c: &mut TurnController) -> u64 {
        c.handle(Event::StartPressed);
        assert_eq!(c.state(), TurnState::Listening);
        c.epoch()
    }

    #[test]
    fn start_is_ignored_while_a_session_is_live() {
        let mut c = controller();
        let epoch = started(&mut c);
        assert!(c.handle(Event::StartPressed).is_empty());
        assert_eq!(c.epoch(), epoch);
        assert_eq!(c.state(), TurnState::Listening);
    }

    #[test]
    fn finish_only_applies_while_listening() {
        let mut c = controller();
        assert!(c.handle(Event::FinishPressed).is_empty());
        started(&mut c);
        assert_eq!(
            c.handle(Event::FinishPressed),
            vec![Effect::FinishCapture]
        );
    }

    #[test]
    fn stop_while_listening_aborts_capture() {
        let mut c = controller();
        started(&mut c);
        let effects = c.handle(Event::StopPressed);
        assert_eq!(effects[0], Effect::AbortCapture);
        assert_eq!(c.state(), TurnState::Stopped);
    }

    #[test]
    fn duplicate_capture_payload_is_not_uploaded_twice() {
        let mut c = controller();
        let epoch = started(&mut c);
        let first = c.handle(Event::UtteranceCaptured {
            epoch,
            payload: vec![1],
        });
        assert!(first.iter().any(|e| matches!(e, Effect::Upload { .. })));
        let second = c.handle(Event::UtteranceCaptured {
            epoch,
            payload: vec![1],
        });
        assert!(second.is_empty());
    }

    #[test]
    fn device_failure_is_terminal_but_restartable() {
        let mut c = controller();
        let epoch = started(&mut c);
        let effects = c.handle(Event::CaptureFailed {
            epoch,
            message: "microphone unavailable: denied".to_string(),
        });
        assert_eq!(c.state(), TurnState::Stopped);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Emit(UiEvent::Error { .. }))));
        // No capture restart was scheduled.
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::StartCapture { .. })));
        // A fresh start still works.
        started(&mut c);
    }

    #[test]
    fn stale_events_from_a_superseded_session_are_dropped() {
        let mut c = controller();
        let old_epoch = started(&mut c);
        c.handle(Event::StopPressed);
        assert!(c
            .handle(Event::UtteranceCaptured {
                epoch: old_epoch,
                payload: vec![0],
            })
            .is_empty());
        assert!(c
            .handle(Event::PlaybackFinished {
                epoch: old_epoch,
                error: None,
            })
            .is_empty());
        assert!(c.handle(Event::ResumeElapsed { epoch: old_epoch }).is_empty());
        assert_eq!(c.state(), TurnState::Stopped);
    }
}

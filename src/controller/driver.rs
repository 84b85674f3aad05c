//! Effect execution: wires the pure controller to the real collaborators.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::backend::BackendClient;
use crate::config::AppConfig;
use crate::ipc::bridge::emit_event;
use crate::playback;
use crate::session::{self, CaptureControl};

use super::{Effect, Event, TurnController, TurnTiming};

/// Owns the controller and runs its effects. All events funnel through
/// [`Driver::dispatch`] on one task, so transitions never overlap.
pub struct Driver {
    controller: TurnController,
    config: Arc<AppConfig>,
    backend: BackendClient,
    events_tx: mpsc::UnboundedSender<Event>,
    /// Control channel into the active capture task, if any.
    capture_ctl: Option<mpsc::UnboundedSender<CaptureControl>>,
}

impl Driver {
    pub fn new(
        config: Arc<AppConfig>,
        backend: BackendClient,
        events_tx: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let timing = TurnTiming {
            reply_grace: config.reply_grace(),
            error_grace: config.error_grace(),
        };
        Self {
            controller: TurnController::new(timing),
            config,
            backend,
            events_tx,
            capture_ctl: None,
        }
    }

    /// Feed one event through the controller and run the resulting effects.
    pub fn dispatch(&mut self, event: Event) {
        for effect in self.controller.handle(event) {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::StartCapture { epoch } => {
                let (ctl_tx, ctl_rx) = mpsc::unbounded_channel();
                self.capture_ctl = Some(ctl_tx);
                tokio::spawn(session::run_capture(
                    Arc::clone(&self.config),
                    epoch,
                    self.events_tx.clone(),
                    ctl_rx,
                ));
            }
            Effect::FinishCapture => self.control_capture(CaptureControl::Finish),
            Effect::AbortCapture => self.control_capture(CaptureControl::Abort),
            Effect::Upload { epoch, payload } => {
                let backend = self.backend.clone();
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = backend.send(payload).await;
                    let _ = tx.send(Event::BackendCompleted { epoch, result });
                });
            }
            Effect::Play { epoch, audio } => {
                playback::spawn(
                    audio,
                    self.config.playback_volume,
                    epoch,
                    self.events_tx.clone(),
                );
            }
            Effect::ScheduleResume { epoch, delay } => {
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Event::ResumeElapsed { epoch });
                });
            }
            Effect::Emit(event) => emit_event(&event),
        }
    }

    fn control_capture(&mut self, ctl: CaptureControl) {
        // A capture that already self-finalized on silence has dropped its
        // receiver; the failed send is harmless.
        match self.capture_ctl.take() {
            Some(tx) => {
                let _ = tx.send(ctl);
            }
            None => debug!(?ctl, "No active capture to control"),
        }
    }
}

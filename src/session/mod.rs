//! Capture session: owns the microphone for the duration of one utterance.
//!
//! A capture task drains the sample ring on a fixed cadence, meters the
//! loudness, and asks the silence detector whether the utterance is over.
//! Teardown is strictly ordered: the polling loop stops, the remaining
//! samples are drained, the payload is assembled, the microphone is
//! released, and only then is the payload handed to the controller.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::{self, wav, TARGET_SAMPLE_RATE};
use crate::config::AppConfig;
use crate::controller::Event;
use crate::vad::level::{self, LEVEL_FRAME_SAMPLES};
use crate::vad::silence::{SilenceDetector, Verdict};

/// Requests from the controller to the active capture task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureControl {
    /// Finalize now and hand the payload off (manual end of utterance).
    Finish,
    /// Finalize and discard; the session is over.
    Abort,
}

/// Why the capture loop stopped.
enum StopCause {
    Silence,
    Finish,
    Abort,
}

/// In-progress recording: ordered, append-only chunks plus a bounded tail
/// window for the level meter.
#[derive(Debug, Default)]
pub struct RecordingBuffer {
    chunks: Vec<Vec<f32>>,
    window: Vec<f32>,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, chunk: Vec<f32>) {
        if chunk.is_empty() {
            return;
        }
        self.window.extend_from_slice(&chunk);
        if self.window.len() > LEVEL_FRAME_SAMPLES {
            let excess = self.window.len() - LEVEL_FRAME_SAMPLES;
            self.window.drain(..excess);
        }
        self.chunks.push(chunk);
    }

    /// Loudness over the most recent meter frame.
    pub fn level(&self) -> f32 {
        level::rms(&self.window)
    }

    pub fn sample_count(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Concatenate every chunk, in append order.
    pub fn into_samples(self) -> Vec<f32> {
        let mut samples = Vec::with_capacity(self.chunks.iter().map(Vec::len).sum());
        for chunk in self.chunks {
            samples.extend(chunk);
        }
        samples
    }
}

/// Run one capture session to completion.
///
/// `epoch` tags every event sent back so the controller can discard results
/// from a session the user has already left. Acquisition failure reports
/// `CaptureFailed` and nothing else; the mic was never held.
pub async fn run_capture(
    config: Arc<AppConfig>,
    epoch: u64,
    events: mpsc::UnboundedSender<Event>,
    mut control: mpsc::UnboundedReceiver<CaptureControl>,
) {
    let (producer, mut consumer) = audio::sample_ring();
    let device = config.input_device.clone();
    let mic = match tokio::task::spawn_blocking(move || {
        audio::capture::start(producer, device.as_deref())
    })
    .await
    {
        Ok(Ok(mic)) => mic,
        Ok(Err(e)) => {
            let _ = events.send(Event::CaptureFailed {
                epoch,
                message: e.to_string(),
            });
            return;
        }
        Err(e) => {
            let _ = events.send(Event::CaptureFailed {
                epoch,
                message: format!("capture startup failed: {}", e),
            });
            return;
        }
    };

    let mut buffer = RecordingBuffer::new();
    let mut detector = SilenceDetector::new(config.silence_threshold, config.silence_duration());
    let mut ticker = tokio::time::interval(config.level_poll());

    let cause = loop {
        tokio::select! {
            _ = ticker.tick() => {
                buffer.push_chunk(consumer.drain());
                if detector.observe(buffer.level(), Instant::now()) == Verdict::UtteranceEnded {
                    info!("Silence dwell elapsed, ending utterance");
                    break StopCause::Silence;
                }
            }
            ctl = control.recv() => match ctl {
                Some(CaptureControl::Finish) => break StopCause::Finish,
                Some(CaptureControl::Abort) | None => break StopCause::Abort,
            },
        }
    };

    // Polling has stopped; collect what the mic produced up to this point.
    buffer.push_chunk(consumer.drain());
    let sample_count = buffer.sample_count();
    let payload = wav::encode(&buffer.into_samples(), TARGET_SAMPLE_RATE);

    // The payload is sealed; release the device before reporting back.
    if tokio::task::spawn_blocking(move || mic.release()).await.is_err() {
        warn!("Capture thread panicked during release");
    }

    match cause {
        StopCause::Abort => {
            debug!(epoch, "Capture aborted, payload discarded");
        }
        StopCause::Silence | StopCause::Finish => {
            debug!(
                epoch,
                samples = sample_count,
                bytes = payload.len(),
                "Utterance captured"
            );
            let _ = events.send(Event::UtteranceCaptured { epoch, payload });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembled_samples_keep_every_chunk_in_order() {
        let mut buf = RecordingBuffer::new();
        buf.push_chunk(vec![1.0, 2.0]);
        buf.push_chunk(vec![]);
        buf.push_chunk(vec![3.0]);
        buf.push_chunk(vec![4.0, 5.0, 6.0]);
        assert_eq!(buf.sample_count(), 6);
        assert_eq!(buf.into_samples(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn level_window_is_bounded_and_tracks_the_tail() {
        let mut buf = RecordingBuffer::new();
        // Loud head, then more than a full window of silence.
        buf.push_chunk(vec![1.0; LEVEL_FRAME_SAMPLES]);
        buf.push_chunk(vec![0.0; LEVEL_FRAME_SAMPLES + 100]);
        assert_eq!(buf.level(), 0.0);
        // The assembled payload still holds everything.
        assert_eq!(buf.sample_count(), 2 * LEVEL_FRAME_SAMPLES + 100);
    }

    #[test]
    fn empty_buffer_reads_silent() {
        let buf = RecordingBuffer::new();
        assert_eq!(buf.level(), 0.0);
        assert_eq!(buf.sample_count(), 0);
    }
}

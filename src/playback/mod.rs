//! Reply playback via rodio.
//!
//! Each reply opens the default output device fresh, decodes the WAV bytes,
//! and blocks a worker thread until the sink drains. Completion is reported
//! as an event on every path; a failed decode must not strand the
//! controller in Speaking.

use std::io::Cursor;

use rodio::{Decoder, OutputStream, Sink};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::controller::Event;

/// Start playing `wav` in the background. Sends `PlaybackFinished` when the
/// audio ends or playback fails.
pub fn spawn(wav: Vec<u8>, volume: f32, epoch: u64, events: mpsc::UnboundedSender<Event>) {
    tokio::task::spawn_blocking(move || {
        let error = match play(wav, volume) {
            Ok(()) => None,
            Err(e) => {
                warn!("Reply playback failed: {:#}", e);
                Some(format!("playback failed: {}", e))
            }
        };
        let _ = events.send(Event::PlaybackFinished { epoch, error });
    });
}

/// Decode and play one WAV buffer, blocking until the sink is empty.
fn play(wav: Vec<u8>, volume: f32) -> anyhow::Result<()> {
    let (_stream, stream_handle) = OutputStream::try_default()
        .map_err(|e| anyhow::anyhow!("failed to open audio output: {}", e))?;
    let sink = Sink::try_new(&stream_handle)
        .map_err(|e| anyhow::anyhow!("failed to create audio sink: {}", e))?;
    sink.set_volume(volume.clamp(0.0, 2.0));

    let source = Decoder::new(Cursor::new(wav))
        .map_err(|e| anyhow::anyhow!("failed to decode reply audio: {}", e))?;
    sink.append(source);
    sink.sleep_until_end();

    debug!("Reply playback finished");
    Ok(())
}

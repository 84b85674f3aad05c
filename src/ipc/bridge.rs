//! stdin reader and stdout event emitter.
//!
//! A blocking thread reads JSON lines from stdin and forwards deserialized
//! commands through an mpsc channel; events go out as JSON lines on stdout.

use std::io::{self, BufRead, Write};

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{UiCommand, UiEvent};

/// Emit a `UiEvent` as one JSON line on stdout and flush.
pub fn emit_event(event: &UiEvent) {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            error!("Failed to serialize event: {}", e);
            return;
        }
    };
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    // Write/flush errors mean the observer is gone; nothing useful to do.
    let _ = writeln!(handle, "{}", json);
    let _ = handle.flush();
}

/// Spawn a blocking thread that reads JSON lines from stdin, deserializes
/// them into `UiCommand`, and forwards them through the returned channel.
///
/// The thread exits when stdin is closed (parent process gone) or on an
/// unrecoverable read error.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<UiCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(text) => {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<UiCommand>(trimmed) {
                        Ok(cmd) => {
                            debug!(?cmd, "Command received");
                            if tx.send(cmd).is_err() {
                                break; // Receiver dropped, main loop is gone.
                            }
                        }
                        Err(e) => {
                            error!("Invalid JSON command: {} (input: {})", e, trimmed);
                            emit_event(&UiEvent::Error {
                                message: format!("Invalid JSON command: {}", e),
                            });
                        }
                    }
                }
                Err(e) => {
                    error!("stdin read error: {}", e);
                    break;
                }
            }
        }
        debug!("stdin reader thread exiting");
    });

    rx
}

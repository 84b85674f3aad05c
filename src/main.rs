//! Voiceloop entry point.
//!
//! Wires the pieces together: configuration, logging, the stdin command
//! bridge, and the event loop around the turn controller. Commands and
//! task events are both drained here, one at a time, so controller
//! transitions are strictly serialized.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use voiceloop::backend::BackendClient;
use voiceloop::config;
use voiceloop::controller::driver::Driver;
use voiceloop::controller::Event;
use voiceloop::ipc::bridge::{emit_event, spawn_stdin_reader};
use voiceloop::ipc::{UiCommand, UiEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = config::paths::get_data_dir();
    let _ = std::fs::create_dir_all(&data_dir);

    // Console logging on stderr (stdout carries the event stream) plus a
    // persistent run log in the data directory. Respects RUST_LOG.
    let file_appender = tracing_appender::rolling::never(&data_dir, "voiceloop.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    emit_event(&UiEvent::Starting {});

    let config = Arc::new(config::load());
    info!(?config, "Configuration loaded");

    let backend = BackendClient::new(&config.backend_url, config.request_timeout())?;
    let mut cmd_rx = spawn_stdin_reader();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut driver = Driver::new(Arc::clone(&config), backend, events_tx);

    emit_event(&UiEvent::Ready {});
    info!("Voiceloop ready");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(UiCommand::Start {}) => driver.dispatch(Event::StartPressed),
                Some(UiCommand::Finish {}) => driver.dispatch(Event::FinishPressed),
                Some(UiCommand::Stop {}) => driver.dispatch(Event::StopPressed),
                Some(UiCommand::Ping {}) => emit_event(&UiEvent::Pong {}),
                Some(UiCommand::Quit {}) => {
                    driver.dispatch(Event::StopPressed);
                    break;
                }
                None => {
                    // stdin closed, parent process gone.
                    info!("stdin closed, shutting down");
                    driver.dispatch(Event::StopPressed);
                    break;
                }
            },
            ev = events_rx.recv() => match ev {
                Some(event) => driver.dispatch(event),
                None => break,
            },
        }
    }

    emit_event(&UiEvent::Stopping {});
    info!("Voiceloop shutting down");
    Ok(())
}

//! Microphone capture via cpal.
//!
//! The cpal stream is not `Send` on every platform, so each capture session
//! runs it on a dedicated thread that owns the stream for its whole
//! lifetime. Samples are down-mixed to mono, resampled to 16 kHz, and
//! pushed into the sample ring in fixed-size chunks.

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use tracing::{error, info};

use super::{SampleProducer, TARGET_SAMPLE_RATE};

/// Chunk size pushed into the ring (80 ms at 16 kHz).
const CHUNK_SAMPLES: usize = 1280;

/// Microphone acquisition or stream failure. Terminal for the session: the
/// controller stops the whole session instead of retrying.
#[derive(Debug, Clone)]
pub struct DeviceError(pub String);

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "microphone unavailable: {}", self.0)
    }
}

impl std::error::Error for DeviceError {}

/// Exclusive handle to a live microphone stream.
///
/// Dropping the handle stops the stream; [`MicStream::release`] additionally
/// joins the capture thread so the device is known to be free on return.
pub struct MicStream {
    stop_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl MicStream {
    /// Stop the stream and wait until the device is released.
    pub fn release(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MicStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Acquire the microphone and start capturing into `producer`.
///
/// Blocks until the stream is running (or has failed to open); call from a
/// blocking context. `device_name` of `None` uses the system default input.
pub fn start(producer: SampleProducer, device_name: Option<&str>) -> Result<MicStream, DeviceError> {
    let device_name = device_name.map(|s| s.to_string());
    let (ready_tx, ready_rx) = mpsc::channel();
    let (stop_tx, stop_rx) = mpsc::channel();

    let thread = std::thread::Builder::new()
        .name("mic-capture".to_string())
        .spawn(move || match build_stream(producer, device_name.as_deref()) {
            Ok(stream) => {
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                // Hold the stream until asked to stop. A recv error means
                // the handle was dropped, which is the same request.
                let _ = stop_rx.recv();
                drop(stream);
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        })
        .map_err(|e| DeviceError(format!("failed to spawn capture thread: {}", e)))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(MicStream {
            stop_tx,
            thread: Some(thread),
        }),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(DeviceError(
                "capture thread exited before the stream opened".to_string(),
            ))
        }
    }
}

/// Resolved info about the audio input we will use.
struct CaptureConfig {
    device: cpal::Device,
    stream_config: StreamConfig,
    native_rate: u32,
}

/// Find and configure the input device.
fn resolve_device(device_name: Option<&str>) -> Result<CaptureConfig, DeviceError> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(|e| DeviceError(format!("failed to enumerate input devices: {}", e)))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| DeviceError(format!("input device not found: {}", name)))?
    } else {
        host.default_input_device()
            .ok_or_else(|| DeviceError("no default input device available".to_string()))?
    };

    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());
    info!(device = %dev_name, "Selected input device");

    let default_config = device
        .default_input_config()
        .map_err(|e| DeviceError(format!("failed to get default input config: {}", e)))?;

    let native_rate = default_config.sample_rate().0;
    let channels = default_config.channels();

    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(native_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        native_rate,
        channels,
        "Input device config (will resample to {}Hz mono if needed)",
        TARGET_SAMPLE_RATE,
    );

    Ok(CaptureConfig {
        device,
        stream_config,
        native_rate,
    })
}

/// Build and start the input stream. Must run on the thread that will own it.
fn build_stream(
    mut producer: SampleProducer,
    device_name: Option<&str>,
) -> Result<cpal::Stream, DeviceError> {
    let cfg = resolve_device(device_name)?;
    let native_rate = cfg.native_rate;
    let channels = cfg.stream_config.channels;
    let needs_resample = native_rate != TARGET_SAMPLE_RATE;
    let needs_downmix = channels > 1;

    // Accumulator for building full chunks before pushing.
    let mut chunk_buf: Vec<f32> = Vec::with_capacity(CHUNK_SAMPLES * 2);

    let stream = cfg
        .device
        .build_input_stream(
            &cfg.stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = if needs_downmix {
                    to_mono(data, channels)
                } else {
                    data.to_vec()
                };

                let resampled = if needs_resample {
                    resample_linear(&mono, native_rate, TARGET_SAMPLE_RATE)
                } else {
                    mono
                };

                chunk_buf.extend_from_slice(&resampled);
                while chunk_buf.len() >= CHUNK_SAMPLES {
                    let chunk: Vec<f32> = chunk_buf.drain(..CHUNK_SAMPLES).collect();
                    if producer.push(&chunk) < CHUNK_SAMPLES {
                        // Ring full; the excess is dropped and the polling
                        // loop will catch up.
                    }
                }
            },
            move |err| {
                error!("Audio input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| DeviceError(format!("failed to build input stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| DeviceError(format!("failed to start input stream: {}", e)))?;

    info!("Microphone capture started");

    Ok(stream)
}

/// Simple linear resampler from `from_rate` to `to_rate`, mono f32 samples.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

/// Down-mix multi-channel audio to mono by averaging channels.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

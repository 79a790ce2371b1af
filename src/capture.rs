//! Microphone capture via cpal (feature `capture`).
//!
//! Captures 16 kHz mono audio and drains it into PCM16-LE byte chunks on a
//! fixed 250 ms interval, preserving sample order end-to-end. Tries an
//! i16/16kHz/mono stream first, falling back to f32 with software
//! conversion for devices that only expose float formats.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{Result, VoxError};
use crate::voice::CaptureSource;

/// Capture sample rate. The transcription backend expects 16 kHz mono.
pub const SAMPLE_RATE: u32 = 16_000;

/// Fixed chunk emission interval.
pub const CHUNK_INTERVAL: Duration = Duration::from_millis(250);

/// Wrapper for `cpal::Stream` so the source struct is `Send`.
///
/// The stream is only touched from `start`/`stop` on the owning controller;
/// it is never shared across threads.
struct SendableStream(#[allow(dead_code)] cpal::Stream);

#[allow(unsafe_code)]
// SAFETY: exclusive access — the stream lives behind the source struct and
// is only created and dropped, never driven, from other threads.
unsafe impl Send for SendableStream {}

/// Real microphone source. One capture session at a time.
pub struct CpalCaptureSource {
    device_name: Option<String>,
    stream: Option<SendableStream>,
    stopped: Arc<AtomicBool>,
    drain: Option<std::thread::JoinHandle<()>>,
}

impl CpalCaptureSource {
    /// `device_name: None` uses the system default input device.
    pub fn new(device_name: Option<String>) -> Self {
        CpalCaptureSource {
            device_name,
            stream: None,
            stopped: Arc::new(AtomicBool::new(false)),
            drain: None,
        }
    }

    fn find_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        match &self.device_name {
            Some(name) => {
                let devices = host
                    .input_devices()
                    .map_err(|e| VoxError::Capture(format!("device enumeration failed: {}", e)))?;
                for device in devices {
                    if device.name().map(|n| n == *name).unwrap_or(false) {
                        return Ok(device);
                    }
                }
                Err(VoxError::Capture(format!("input device not found: {}", name)))
            }
            None => host
                .default_input_device()
                .ok_or_else(|| VoxError::Capture("no default input device".to_string())),
        }
    }

    fn build_stream(
        device: &cpal::Device,
        buffer: Arc<Mutex<Vec<i16>>>,
    ) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };
        let err_callback = |err| {
            warn!(error = %err, "audio stream error");
        };

        // Preferred: i16 samples, no conversion.
        let sink = Arc::clone(&buffer);
        if let Ok(stream) = device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = sink.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // Fallback: f32 samples converted in software.
        let sink = Arc::clone(&buffer);
        device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend(
                            data.iter()
                                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                        );
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| VoxError::Capture(format!("failed to open input stream: {}", e)))
    }
}

impl CaptureSource for CpalCaptureSource {
    fn start(&mut self, chunks: mpsc::UnboundedSender<Vec<u8>>) -> Result<()> {
        self.stop();
        self.stopped.store(false, Ordering::SeqCst);

        let device = self.find_device()?;
        let buffer: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));
        let stream = Self::build_stream(&device, Arc::clone(&buffer))?;
        stream
            .play()
            .map_err(|e| VoxError::Capture(format!("failed to start capture: {}", e)))?;
        self.stream = Some(SendableStream(stream));

        // Drain thread: every interval, swap out accumulated samples and
        // emit them as one PCM16-LE chunk.
        let stopped = Arc::clone(&self.stopped);
        self.drain = Some(std::thread::spawn(move || {
            while !stopped.load(Ordering::SeqCst) {
                std::thread::sleep(CHUNK_INTERVAL);
                let samples = match buffer.lock() {
                    Ok(mut buf) => std::mem::take(&mut *buf),
                    Err(_) => break,
                };
                if samples.is_empty() {
                    continue;
                }
                let mut bytes = Vec::with_capacity(samples.len() * 2);
                for sample in samples {
                    bytes.extend_from_slice(&sample.to_le_bytes());
                }
                if chunks.send(bytes).is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        // Dropping the stream releases the device.
        self.stream = None;
        if let Some(drain) = self.drain.take() {
            let _ = drain.join();
        }
    }
}

//! Voice capture controller.
//!
//! Bridges a microphone-style capture source to the duplex transcription
//! channel: outbound audio chunks are forwarded as binary frames
//! (best-effort — capture continues if an individual send fails), inbound
//! `transcript.partial` / `transcript.final` events update the transient
//! transcript state, and each final segment is appended to the pending
//! outgoing message draft.
//!
//! Teardown is scoped, not order-dependent: `stop()` closes the channel,
//! stops the capture source, and aborts the pump unconditionally.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::{paths, ClientConfig};
use crate::duplex::{open_duplex, DuplexTransport};
use crate::error::Result;

/// Produces bounded binary audio chunks at a fixed emission interval,
/// ordering preserved. Implemented by the cpal microphone source (feature
/// `capture`) and by test doubles.
pub trait CaptureSource: Send {
    /// Begin producing chunks into `chunks`. Errors here (device denied,
    /// unavailable) propagate to the caller of
    /// [`VoiceController::start`].
    fn start(&mut self, chunks: mpsc::UnboundedSender<Vec<u8>>) -> Result<()>;

    /// Stop producing and release the device. Must be safe to call twice.
    fn stop(&mut self);
}

/// A source that produces no audio. Useful with the mock transport, where
/// transcript events arrive regardless of what is sent.
#[derive(Debug, Default)]
pub struct NullSource;

impl CaptureSource for NullSource {
    fn start(&mut self, _chunks: mpsc::UnboundedSender<Vec<u8>>) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}
}

/// Transcript progress surfaced to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceUpdate {
    Partial(String),
    Final(String),
}

/// Transient per-capture transcript state. Reset on every `start()`; never
/// persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptState {
    pub partial: String,
    pub final_text: String,
}

struct ActiveCapture {
    pump: tokio::task::JoinHandle<()>,
    forward: tokio::task::JoinHandle<()>,
}

/// Owns one capture session at a time: a duplex channel plus a capture
/// source. Starting while already running tears the previous session down
/// first.
pub struct VoiceController {
    config: ClientConfig,
    transport: DuplexTransport,
    source: Box<dyn CaptureSource>,
    transcript: Arc<Mutex<TranscriptState>>,
    draft: Arc<Mutex<String>>,
    active: Option<ActiveCapture>,
}

impl VoiceController {
    pub fn new(
        config: ClientConfig,
        transport: DuplexTransport,
        source: Box<dyn CaptureSource>,
    ) -> Self {
        VoiceController {
            config,
            transport,
            source,
            transcript: Arc::new(Mutex::new(TranscriptState::default())),
            draft: Arc::new(Mutex::new(String::new())),
            active: None,
        }
    }

    /// Open the channel, start capture, and begin pumping. Returns the
    /// update channel for this capture session.
    ///
    /// If the capture source fails to start, the already-open channel is
    /// closed before the error propagates — no partial session is left
    /// behind.
    pub async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<VoiceUpdate>> {
        if self.active.is_some() {
            self.stop();
        }
        if let Ok(mut transcript) = self.transcript.lock() {
            *transcript = TranscriptState::default();
        }

        let mut channel =
            open_duplex(self.transport, &self.config.base_url, paths::WS_TRANSCRIBE).await?;

        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        if let Err(err) = self.source.start(chunk_tx) {
            channel.close();
            return Err(err);
        }

        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let transcript = Arc::clone(&self.transcript);
        let draft = Arc::clone(&self.draft);

        // Outbound half: capture chunks → channel frames, best-effort — a
        // dropped frame does not stop capture.
        let outbound = channel.sender();
        let forward = tokio::spawn(async move {
            while let Some(bytes) = chunk_rx.recv().await {
                let _ = outbound.send(bytes);
            }
        });

        // Inbound half: transcript events → state + updates.
        let pump = tokio::spawn(async move {
            while let Some(event) = channel.next_event().await {
                let Some(text) = event.data.get("text").and_then(|t| t.as_str()) else {
                    continue;
                };
                match event.event.as_str() {
                    "transcript.partial" => {
                        if let Ok(mut state) = transcript.lock() {
                            state.partial = text.to_string();
                        }
                        let _ = update_tx.send(VoiceUpdate::Partial(text.to_string()));
                    }
                    "transcript.final" => {
                        if let Ok(mut state) = transcript.lock() {
                            state.final_text = text.to_string();
                        }
                        if let Ok(mut draft) = draft.lock() {
                            if !draft.is_empty() {
                                draft.push(' ');
                            }
                            draft.push_str(text);
                        }
                        let _ = update_tx.send(VoiceUpdate::Final(text.to_string()));
                    }
                    _ => debug!(event = %event.event, "unhandled duplex event"),
                }
            }
        });

        self.active = Some(ActiveCapture { pump, forward });
        Ok(update_rx)
    }

    /// Tear the capture session down: channel, source, and pump, each
    /// unconditionally. Idempotent. No update is delivered after this
    /// returns.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            // Aborting the pump drops the duplex handle, which aborts its
            // transport tasks.
            active.pump.abort();
            active.forward.abort();
        }
        self.source.stop();
    }

    /// Snapshot of the transient transcript state.
    pub fn transcript(&self) -> TranscriptState {
        self.transcript
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    /// Drain the pending outgoing message draft built from final segments.
    pub fn take_draft(&self) -> String {
        self.draft
            .lock()
            .map(|mut draft| std::mem::take(&mut *draft))
            .unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for VoiceController {
    fn drop(&mut self) {
        self.stop();
    }
}

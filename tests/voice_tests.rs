//! Tests for the voice capture controller — transcript flow over the mock
//! transport, draft accumulation, failure and teardown paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use voxlink::config::ClientConfig;
use voxlink::duplex::DuplexTransport;
use voxlink::error::{Result, VoxError};
use voxlink::voice::{CaptureSource, NullSource, VoiceController, VoiceUpdate};

/// Emits a fixed set of chunks immediately on start.
struct ScriptedSource {
    chunks: Vec<Vec<u8>>,
    stopped: Arc<AtomicBool>,
}

impl CaptureSource for ScriptedSource {
    fn start(&mut self, tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<()> {
        for chunk in self.chunks.drain(..) {
            let _ = tx.send(chunk);
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Simulates a denied microphone.
struct DeniedSource;

impl CaptureSource for DeniedSource {
    fn start(&mut self, _tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<()> {
        Err(VoxError::Capture("microphone denied".to_string()))
    }

    fn stop(&mut self) {}
}

fn controller(source: Box<dyn CaptureSource>) -> VoiceController {
    VoiceController::new(ClientConfig::default(), DuplexTransport::Mock, source)
}

#[tokio::test(start_paused = true)]
async fn test_transcript_flow_partial_then_final() {
    let mut voice = controller(Box::new(NullSource));
    let mut updates = voice.start().await.expect("start");

    assert_eq!(
        updates.recv().await,
        Some(VoiceUpdate::Partial("hello ".to_string()))
    );
    assert_eq!(
        updates.recv().await,
        Some(VoiceUpdate::Partial("hello world".to_string()))
    );
    assert_eq!(
        updates.recv().await,
        Some(VoiceUpdate::Final("hello world (final)".to_string()))
    );

    let transcript = voice.transcript();
    assert_eq!(transcript.partial, "hello world");
    assert_eq!(transcript.final_text, "hello world (final)");
}

#[tokio::test(start_paused = true)]
async fn test_final_segments_feed_the_draft() {
    let mut voice = controller(Box::new(NullSource));
    let mut updates = voice.start().await.expect("start");
    while let Some(update) = updates.recv().await {
        if matches!(update, VoiceUpdate::Final(_)) {
            break;
        }
    }
    assert_eq!(voice.take_draft(), "hello world (final)");
    // Draining empties the draft.
    assert_eq!(voice.take_draft(), "");
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_updates_and_stops_source() {
    let stopped = Arc::new(AtomicBool::new(false));
    let source = ScriptedSource {
        chunks: vec![vec![0u8; 512], vec![1u8; 512]],
        stopped: Arc::clone(&stopped),
    };
    let mut voice = controller(Box::new(source));
    let mut updates = voice.start().await.expect("start");

    // First emission arrives, then the session is torn down.
    assert!(updates.recv().await.is_some());
    voice.stop();
    assert!(!voice.is_running());
    assert!(stopped.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert!(updates.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_any_event_suppresses_all() {
    let mut voice = controller(Box::new(NullSource));
    let mut updates = voice.start().await.expect("start");
    voice.stop();
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert!(updates.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_denied_microphone_propagates_and_leaves_nothing_running() {
    let mut voice = controller(Box::new(DeniedSource));
    let err = voice.start().await.expect_err("capture must fail");
    assert!(matches!(err, VoxError::Capture(_)));
    assert!(!voice.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_transcript_resets_on_restart() {
    let mut voice = controller(Box::new(NullSource));
    let mut updates = voice.start().await.expect("start");
    while let Some(update) = updates.recv().await {
        if matches!(update, VoiceUpdate::Final(_)) {
            break;
        }
    }
    assert!(!voice.transcript().final_text.is_empty());

    // Restart: transient state is cleared, a fresh schedule begins.
    let mut updates = voice.start().await.expect("restart");
    assert_eq!(voice.transcript(), Default::default());
    assert_eq!(
        updates.recv().await,
        Some(VoiceUpdate::Partial("hello ".to_string()))
    );
    voice.stop();
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let mut voice = controller(Box::new(NullSource));
    let _updates = voice.start().await.expect("start");
    voice.stop();
    voice.stop();
    assert!(!voice.is_running());
}

//! Duplex channel client: binary frames out, structured events in.
//!
//! Carries captured audio to the transcription endpoint and transcript
//! events back. Two transports behind one handle shape, chosen explicitly at
//! open time (a construction parameter, not a global flag):
//!
//! - [`DuplexTransport::Live`] — a tokio-tungstenite WebSocket to
//!   `ws(s)://host/path`; `wss` iff the configured base URL is `https`.
//! - [`DuplexTransport::Mock`] — a deterministic timer-driven schedule of
//!   canned transcript events, for development without a reachable backend.
//!
//! Inbound frames are JSON `{event, data}`; malformed frames are dropped
//! silently — the caller sees the same [`StreamEvent`] shape regardless of
//! transport. Outbound frames are forwarded as-is, ordering preserved, no
//! fragmentation or reassembly at this layer. No reconnect.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::debug;

use crate::error::{Result, VoxError};
use crate::sse::{StreamEvent, DEFAULT_EVENT};

/// Transport strategy, chosen by the caller at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplexTransport {
    Live,
    Mock,
}

/// Mock schedule: (offset from open, event type, transcript text).
pub const MOCK_SCHEDULE: &[(u64, &str, &str)] = &[
    (200, "transcript.partial", "hello "),
    (500, "transcript.partial", "hello world"),
    (1200, "transcript.final", "hello world (final)"),
];

/// Inbound wire frame. `event` defaults to `"message"` when absent.
#[derive(Debug, Deserialize)]
struct WireEvent {
    event: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Handle to one open duplex channel.
///
/// Same close contract as [`crate::stream::StreamHandle`]: after `close()`
/// returns, `next_event` yields `None` unconditionally and no pending mock
/// emission ever fires. At most one channel should be open per controller;
/// opening a new one assumes the previous was closed by the caller.
pub struct DuplexHandle {
    out_tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    closed: bool,
}

impl DuplexHandle {
    /// Forward one binary frame, best-effort. Ordering across calls is
    /// preserved end-to-end; a failed send is dropped without error.
    pub fn send(&self, bytes: Vec<u8>) {
        let _ = self.out_tx.send(bytes);
    }

    /// Clone of the outbound frame queue, for callers pumping audio from a
    /// separate task. Same best-effort semantics as [`send`](Self::send).
    pub fn sender(&self) -> mpsc::UnboundedSender<Vec<u8>> {
        self.out_tx.clone()
    }

    /// Next inbound event, or `None` once the channel terminated or was
    /// closed.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    /// Terminate the channel. Idempotent. Emissions already fired stand;
    /// emissions not yet due never fire.
    pub fn close(&mut self) {
        self.closed = true;
        for task in &self.tasks {
            task.abort();
        }
        self.rx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for DuplexHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Open a duplex channel to `path` on the orchestrator at `base_url`.
///
/// The mock transport connects nowhere and ignores `base_url`/`path`.
pub async fn open_duplex(
    transport: DuplexTransport,
    base_url: &str,
    path: &str,
) -> Result<DuplexHandle> {
    match transport {
        DuplexTransport::Mock => Ok(open_mock()),
        DuplexTransport::Live => open_live(base_url, path).await,
    }
}

/// Map an HTTP base address to the WebSocket URL for `path`: encrypted
/// variant iff the base itself is encrypted.
pub fn ws_url(base_url: &str, path: &str) -> Result<String> {
    if let Some(authority) = base_url.strip_prefix("https://") {
        let host = authority.split('/').next().unwrap_or(authority);
        Ok(format!("wss://{}{}", host, path))
    } else if let Some(authority) = base_url.strip_prefix("http://") {
        let host = authority.split('/').next().unwrap_or(authority);
        Ok(format!("ws://{}{}", host, path))
    } else {
        Err(VoxError::Config(format!(
            "base URL has no http(s) scheme: {}",
            base_url
        )))
    }
}

fn open_mock() -> DuplexHandle {
    // Outbound frames go nowhere: receiver is dropped, send() is a no-op.
    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let (tx, rx) = mpsc::unbounded_channel();

    let timer = tokio::spawn(async move {
        let mut elapsed = 0u64;
        for (offset, event, text) in MOCK_SCHEDULE {
            tokio::time::sleep(Duration::from_millis(offset - elapsed)).await;
            elapsed = *offset;
            if tx
                .send(StreamEvent::new(*event, json!({ "text": text })))
                .is_err()
            {
                return;
            }
        }
    });

    DuplexHandle {
        out_tx,
        rx,
        tasks: vec![timer],
        closed: false,
    }
}

async fn open_live(base_url: &str, path: &str) -> Result<DuplexHandle> {
    let url = ws_url(base_url, path)?;
    let (socket, _) = connect_async(url.as_str()).await?;
    debug!(url = %url, "duplex channel open");
    let (mut sink, mut source) = socket.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (tx, rx) = mpsc::unbounded_channel();

    // Writer: outbound frames as-is, in order. Stops when the handle closes
    // the queue or the socket rejects a frame.
    let writer = tokio::spawn(async move {
        while let Some(bytes) = out_rx.recv().await {
            if sink.send(WsMessage::Binary(bytes)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Reader: decode inbound frames; malformed ones are dropped silently.
    let reader = tokio::spawn(async move {
        while let Some(message) = source.next().await {
            let raw = match message {
                Ok(WsMessage::Text(text)) => text,
                Ok(WsMessage::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                Ok(_) => continue,
                Err(_) => break,
            };
            let frame: WireEvent = match serde_json::from_str(&raw) {
                Ok(frame) => frame,
                Err(_) => {
                    debug!("dropping undecodable duplex frame");
                    continue;
                }
            };
            let event = frame.event.unwrap_or_else(|| DEFAULT_EVENT.to_string());
            if tx.send(StreamEvent::new(event, frame.data)).is_err() {
                break;
            }
        }
    });

    Ok(DuplexHandle {
        out_tx,
        rx,
        tasks: vec![writer, reader],
        closed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_plain() {
        assert_eq!(
            ws_url("http://localhost:8080", "/v1/transcribe/ws").unwrap(),
            "ws://localhost:8080/v1/transcribe/ws"
        );
    }

    #[test]
    fn test_ws_url_encrypted() {
        assert_eq!(
            ws_url("https://orch.example", "/v1/transcribe/ws").unwrap(),
            "wss://orch.example/v1/transcribe/ws"
        );
    }

    #[test]
    fn test_ws_url_ignores_base_path() {
        assert_eq!(
            ws_url("https://orch.example/api", "/ws").unwrap(),
            "wss://orch.example/ws"
        );
    }

    #[test]
    fn test_ws_url_rejects_unknown_scheme() {
        assert!(ws_url("ftp://x", "/ws").is_err());
    }
}

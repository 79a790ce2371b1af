//! Text-to-speech stream consumption.
//!
//! `GET /v1/tts/stream?q=<text>` emits `tts.audio.chunk` / `tts.done`
//! events (some deployments use the generic `chunk` / `complete` names —
//! both are accepted). Playback is out of scope; this module only maps the
//! stream to typed updates.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::{paths, ClientConfig};
use crate::headers::build_headers;
use crate::stream::open_stream;

#[derive(Debug, Clone, PartialEq)]
pub enum TtsUpdate {
    /// One audio chunk payload, as delivered by the wire.
    Chunk(Value),
    Done,
    Failed(String),
}

/// Handle to one in-flight synthesis stream.
pub struct TtsHandle {
    rx: mpsc::UnboundedReceiver<TtsUpdate>,
    task: tokio::task::JoinHandle<()>,
    closed: bool,
}

impl TtsHandle {
    pub async fn next_update(&mut self) -> Option<TtsUpdate> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    /// Idempotent; aborts the underlying stream.
    pub fn close(&mut self) {
        self.closed = true;
        self.task.abort();
        self.rx.close();
    }
}

impl Drop for TtsHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start synthesizing `text`.
pub fn speak(
    http: &reqwest::Client,
    config: &ClientConfig,
    session_id: &str,
    text: &str,
) -> TtsHandle {
    let url = format!(
        "{}?q={}",
        config.endpoint(paths::TTS_STREAM),
        urlencode(text)
    );
    let headers = build_headers(session_id, None, config.auth_token.as_deref());
    let mut stream = open_stream(http, url, headers, None);
    let (tx, rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        while let Some(event) = stream.next_event().await {
            let update = match event.event.as_str() {
                "tts.audio.chunk" | "chunk" => TtsUpdate::Chunk(event.data),
                "tts.done" | "complete" => TtsUpdate::Done,
                "error" => TtsUpdate::Failed(
                    event
                        .data
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| event.data.to_string()),
                ),
                _ => continue,
            };
            let done = matches!(update, TtsUpdate::Done | TtsUpdate::Failed(_));
            if tx.send(update).is_err() || done {
                break;
            }
        }
    });

    TtsHandle {
        rx,
        task,
        closed: false,
    }
}

/// Minimal query-string escaping for the `q` parameter.
fn urlencode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlencode_passthrough() {
        assert_eq!(urlencode("hello-world_1.2~"), "hello-world_1.2~");
    }

    #[test]
    fn test_urlencode_escapes_space_and_unicode() {
        assert_eq!(urlencode("a b"), "a%20b");
        assert_eq!(urlencode("é"), "%C3%A9");
    }
}

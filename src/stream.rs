//! Unidirectional stream client.
//!
//! Opens one streaming request against the orchestrator and feeds the
//! response body through a dedicated [`EventStreamParser`], delivering the
//! resulting events over an unbounded channel owned by the returned
//! [`StreamHandle`].
//!
//! Failure contract: a connect error, a non-success status, or a mid-stream
//! read error all degrade to exactly one synthetic `error` event followed by
//! stream termination — the reader task never panics and never propagates an
//! error out of the read loop. Nothing is retried; a dropped connection is
//! termination, not a silent reconnect. No transport timeout is enforced: a
//! stalled connection never terminates on its own, but `close()` is always
//! available.

use reqwest::header::HeaderMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::sse::{EventStreamParser, StreamEvent};

/// Handle to one open event stream.
///
/// Drain with [`next_event`](StreamHandle::next_event); cancel with
/// [`close`](StreamHandle::close). After `close()` returns, `next_event`
/// yields `None` unconditionally — buffered events included — so zero
/// further events are ever observed for this instance. Dropping the handle
/// also aborts the transfer.
pub struct StreamHandle {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    task: tokio::task::JoinHandle<()>,
    closed: bool,
}

impl StreamHandle {
    /// Next event in wire order, or `None` once the stream has terminated
    /// or the handle was closed.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    /// Abort the underlying transfer. Idempotent; safe after completion.
    pub fn close(&mut self) {
        self.closed = true;
        self.task.abort();
        self.rx.close();
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Open a streaming request.
///
/// Method is POST iff `body` is supplied (sent as JSON), else GET. The
/// response body is parsed incrementally; every event is forwarded in wire
/// order. `headers` should come from [`crate::headers::build_headers`].
pub fn open_stream(
    client: &reqwest::Client,
    url: impl Into<String>,
    headers: HeaderMap,
    body: Option<Value>,
) -> StreamHandle {
    let url = url.into();
    let (tx, rx) = mpsc::unbounded_channel();
    let client = client.clone();

    let task = tokio::spawn(async move {
        let request = match &body {
            Some(json) => client.post(&url).json(json),
            None => client.get(&url),
        };
        let request = request
            .headers(headers)
            .header(reqwest::header::ACCEPT, "text/event-stream");

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(url = %url, error = %err, "stream connect failed");
                let _ = tx.send(StreamEvent::error(err));
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = %status, "stream rejected");
            let _ = tx.send(StreamEvent::error(format!(
                "stream connection failed: {}",
                status
            )));
            return;
        }

        let mut parser = EventStreamParser::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    debug!(url = %url, error = %err, "stream read failed");
                    let _ = tx.send(StreamEvent::error(err));
                    return;
                }
            };
            for event in parser.push(&String::from_utf8_lossy(&chunk)) {
                if tx.send(event).is_err() {
                    // Receiver closed — stop reading.
                    return;
                }
            }
        }
        debug!(url = %url, "stream exhausted");
    });

    StreamHandle {
        rx,
        task,
        closed: false,
    }
}

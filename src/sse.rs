//! Incremental parser for the orchestrator's line-delimited event protocol.
//!
//! Wire format (server-sent-event style):
//!
//! ```text
//! event: llm.token
//! data: {"token": "Hel"}
//! data: {"token": "lo"}
//!
//! event: llm.done
//! data: {"usage": {...}}
//! ```
//!
//! The parser consumes text chunks in arrival order and makes no assumption
//! about chunk boundaries — a logical line may span any number of chunks.
//! Every `data:` line dispatches immediately under the most recently declared
//! `event:` type (default `"message"`); the type register persists across
//! records and is never reset by dispatch. Blank lines are pure record
//! separators and are consumed without effect; lines with any other prefix
//! are ignored.
//!
//! The line buffer is unbounded. Feeding the parser an adversarial
//! never-terminated line grows memory without limit; record sizes on this
//! protocol are small enough that no cap is enforced.

use serde_json::Value;

/// One discrete event off the wire. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub event: String,
    pub data: Value,
}

impl StreamEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        StreamEvent {
            event: event.into(),
            data,
        }
    }

    /// Synthetic transport-failure event emitted by the stream client.
    pub fn error(cause: impl std::fmt::Display) -> Self {
        StreamEvent {
            event: "error".to_string(),
            data: Value::String(cause.to_string()),
        }
    }
}

/// Default event type when the wire has not declared one.
pub const DEFAULT_EVENT: &str = "message";

/// Resumable line-delimited event parser. One instance per stream.
#[derive(Debug)]
pub struct EventStreamParser {
    buffer: String,
    /// Current event-type register; survives across `push` calls and across
    /// dispatched events.
    event: String,
}

impl Default for EventStreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStreamParser {
    pub fn new() -> Self {
        EventStreamParser {
            buffer: String::new(),
            event: DEFAULT_EVENT.to_string(),
        }
    }

    /// Feed one chunk, returning every event completed by it, in wire order.
    /// Partial trailing lines stay buffered for the next call.
    pub fn push(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].trim_end().to_string();
            self.buffer.drain(..=newline);

            if line.is_empty() {
                // Record separator — every data line self-dispatches, so
                // there is nothing to flush here.
                continue;
            }
            if let Some(rest) = line.strip_prefix("event:") {
                self.event = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("data:") {
                let payload = rest.trim();
                let data = serde_json::from_str::<Value>(payload)
                    .unwrap_or_else(|_| Value::String(payload.to_string()));
                events.push(StreamEvent::new(self.event.clone(), data));
            }
            // Any other prefix (comments, unknown fields): ignored.
        }

        events
    }

    /// Bytes currently buffered waiting for a terminating newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

//! Chat turn orchestration.
//!
//! Drives one conversational turn against the streaming chat endpoint:
//! sends the query, accumulates `llm.token` fragments, and on `llm.done`
//! commits the finished assistant message. `regenerate` re-issues the
//! existing conversation without appending a new user turn but shares the
//! same accumulation and finalization contract — including finalizing with
//! the buffer's value at completion time, never a stale capture.
//!
//! Only one accumulation should be active at a time; this layer does not
//! guard against overlapping turns (caller responsibility).

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::{paths, ClientConfig};
use crate::error::{Result, VoxError};
use crate::headers::build_headers;
use crate::session::{ChatMessage, SessionStore};
use crate::stream::open_stream;

/// Placeholder committed when a stream completes without producing any
/// token text.
pub const EMPTY_TURN_PLACEHOLDER: &str = "...";

/// Where completed transcripts go. The orchestrator only ever sees the
/// active session's message sequence — this seam is all it gets of the
/// store.
pub trait TranscriptSink: Send + Sync {
    fn commit(&self, messages: &[ChatMessage]);
}

impl TranscriptSink for Mutex<SessionStore> {
    fn commit(&self, messages: &[ChatMessage]) {
        match self.lock() {
            Ok(mut store) => {
                if let Err(err) = store.upsert_active_messages(messages) {
                    warn!(error = %err, "transcript commit failed");
                }
            }
            Err(_) => warn!("transcript sink poisoned, dropping commit"),
        }
    }
}

/// Progress of one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnUpdate {
    /// One incremental fragment of generated text.
    Token(String),
    /// The turn finished; `message` is already committed to the sink.
    Completed { message: ChatMessage, meta: Value },
    /// Transport failure; the turn is over. Nothing is retried.
    Failed(String),
}

/// Handle to one in-flight turn. Drain with
/// [`next_update`](TurnHandle::next_update); cancel-and-discard with
/// [`cancel`](TurnHandle::cancel) (the basis of cancel-and-restart).
pub struct TurnHandle {
    rx: mpsc::UnboundedReceiver<TurnUpdate>,
    task: tokio::task::JoinHandle<()>,
    closed: bool,
}

impl TurnHandle {
    pub async fn next_update(&mut self) -> Option<TurnUpdate> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    /// Abort the turn and its underlying stream. Idempotent. No update is
    /// observed after this returns; nothing is committed for an aborted
    /// turn.
    pub fn cancel(&mut self) {
        self.closed = true;
        self.task.abort();
        self.rx.close();
    }
}

impl Drop for TurnHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Response of the non-streaming chat endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    #[serde(default)]
    pub fallback_used: bool,
}

/// Chat stream orchestrator.
pub struct ChatClient {
    http: reqwest::Client,
    config: ClientConfig,
    session_id: String,
    sink: Arc<dyn TranscriptSink>,
}

impl ChatClient {
    pub fn new(
        http: reqwest::Client,
        config: ClientConfig,
        session_id: String,
        sink: Arc<dyn TranscriptSink>,
    ) -> Self {
        ChatClient {
            http,
            config,
            session_id,
            sink,
        }
    }

    /// Start a turn: append the outgoing user message, commit the updated
    /// conversation, then stream the response.
    pub fn send(&self, mut conversation: Vec<ChatMessage>, query: impl Into<String>) -> TurnHandle {
        conversation.push(ChatMessage::user(query));
        self.sink.commit(&conversation);
        self.run_turn(conversation)
    }

    /// Re-issue the existing conversation without a new user turn.
    pub fn regenerate(&self, conversation: Vec<ChatMessage>) -> TurnHandle {
        self.run_turn(conversation)
    }

    fn run_turn(&self, mut conversation: Vec<ChatMessage>) -> TurnHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let url = self.config.endpoint(paths::CHAT_STREAM);
        let headers = build_headers(
            &self.session_id,
            None,
            self.config.auth_token.as_deref(),
        );
        let body = json!({
            "query": conversation.last().map(|m| m.content.as_str()).unwrap_or(""),
            "session_id": self.session_id,
        });
        let http = self.http.clone();
        let sink = Arc::clone(&self.sink);

        let task = tokio::spawn(async move {
            let mut stream = open_stream(&http, url, headers, Some(body));
            let mut buffer = String::new();

            while let Some(event) = stream.next_event().await {
                match event.event.as_str() {
                    "llm.token" => {
                        let text = token_text(&event.data);
                        if !text.is_empty() {
                            buffer.push_str(&text);
                            if tx.send(TurnUpdate::Token(text)).is_err() {
                                return;
                            }
                        }
                    }
                    "llm.done" => {
                        // Finalize with the buffer as it stands now.
                        let content = if buffer.is_empty() {
                            EMPTY_TURN_PLACEHOLDER.to_string()
                        } else {
                            std::mem::take(&mut buffer)
                        };
                        let message = ChatMessage::assistant(content);
                        conversation.push(message.clone());
                        sink.commit(&conversation);
                        let _ = tx.send(TurnUpdate::Completed {
                            message,
                            meta: event.data,
                        });
                        stream.close();
                        return;
                    }
                    "error" => {
                        let cause = event
                            .data
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| event.data.to_string());
                        let _ = tx.send(TurnUpdate::Failed(cause));
                        stream.close();
                        return;
                    }
                    _ => {}
                }
            }
            // Stream ended without a done event: surface as failure.
            let _ = tx.send(TurnUpdate::Failed("stream ended early".to_string()));
        });

        TurnHandle {
            rx,
            task,
            closed: false,
        }
    }

    /// Non-streaming turn: `POST /v1/chat` → `{answer, fallback_used}`.
    pub async fn chat_once(&self, conversation: &[ChatMessage]) -> Result<ChatAnswer> {
        let body = json!({
            "query": conversation.last().map(|m| m.content.as_str()).unwrap_or(""),
            "session_id": self.session_id,
        });
        let response = self
            .http
            .post(self.config.endpoint(paths::CHAT))
            .headers(build_headers(
                &self.session_id,
                None,
                self.config.auth_token.as_deref(),
            ))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VoxError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }
}

/// Token payloads arrive either as a bare string or as `{"token": "..."}`.
fn token_text(data: &Value) -> String {
    match data {
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .get("token")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

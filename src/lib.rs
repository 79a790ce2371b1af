//! # voxlink
//!
//! Client library for a voice-enabled conversational assistant backend.
//!
//! The backend ("orchestrator") exposes a small fixed HTTP surface: a
//! streaming chat endpoint emitting line-delimited events, a duplex
//! WebSocket carrying raw audio out and transcript events back, and a
//! handful of plain JSON endpoints (ingest, retrieve, health). This crate
//! covers the transport and session-synchronization layer:
//!
//! - [`sse`] — incremental parser for the line-delimited event protocol
//! - [`stream`] — one-shot streaming request, events over a typed channel
//! - [`duplex`] — bidirectional channel with live and mock transports
//! - [`chat`] — turn orchestration: token accumulation, commit, regenerate
//! - [`session`] — persisted chat session collection (SQLite-backed)
//! - [`voice`] — microphone capture pumped into the duplex channel
//! - [`rag`], [`tts`] — thin wrappers over the remaining endpoints
//!
//! ## Design
//! - Events are delivered over `mpsc` channels drained by the owner, never
//!   ad-hoc callbacks: ordering within one stream equals wire order, and
//!   `close()` on any handle guarantees no further events from it.
//! - Nothing reconnects, retries, or times out at this layer. A dropped
//!   stream surfaces as termination; `close()` is always available.
//! - The session store is a whole-document read-modify-persist container,
//!   explicitly injected where needed. Single client process assumed.

pub mod chat;
pub mod cli;
pub mod config;
pub mod duplex;
pub mod error;
pub mod headers;
pub mod rag;
pub mod session;
pub mod sse;
pub mod stream;
pub mod tts;
pub mod voice;

#[cfg(feature = "capture")]
pub mod capture;

pub use chat::{ChatClient, TranscriptSink, TurnHandle, TurnUpdate};
pub use config::ClientConfig;
pub use duplex::{DuplexHandle, DuplexTransport};
pub use error::{Result, VoxError};
pub use session::{ChatMessage, Role, Session, SessionCollection, SessionStore};
pub use sse::{EventStreamParser, StreamEvent};
pub use stream::StreamHandle;
pub use voice::{CaptureSource, VoiceController, VoiceUpdate};

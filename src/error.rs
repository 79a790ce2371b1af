//! Crate-level error type.
//!
//! Transport failures inside a running stream never surface here — the
//! stream and duplex clients degrade to synthetic `error` events or silent
//! drops per the wire contract. `VoxError` covers everything that happens
//! *before* a stream is established plus the plain request/response paths.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VoxError>;

#[derive(Debug, Error)]
pub enum VoxError {
    /// Request construction or plain HTTP round-trip failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from a plain (non-streaming) endpoint.
    #[error("api error: {status}: {message}")]
    Api { status: u16, message: String },

    /// WebSocket handshake or socket-level failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Local persistence (SQLite) failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// JSON encode/decode failure on a plain endpoint.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Audio source acquisition or capture failure.
    #[error("capture error: {0}")]
    Capture(String),

    /// Bad configuration (unparseable file, invalid base URL).
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

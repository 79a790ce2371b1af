//! Persisted chat session collection.
//!
//! The whole collection is one JSON document stored under a fixed key in a
//! SQLite key-value table and overwritten wholesale on every mutation —
//! store state and persisted state are always consistent after any call
//! returns. Field names are camelCase on disk (`createdAt`, `currentId`),
//! matching the document shape this store has always used.
//!
//! Known limitation: whole-document read-modify-persist with no locking.
//! One client process at a time; concurrent writers from independent
//! processes will lose updates.

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;

/// Storage key for the persisted collection.
const SESSIONS_KEY: &str = "chat_sessions_v1";
/// Storage key for the stable client session id (the `X-Session-Id` value).
const CLIENT_ID_KEY: &str = "session_id";

/// Title given to a session before one is derived from its first user
/// message.
pub const DEFAULT_TITLE: &str = "New chat";

/// Derived titles keep the first 40 characters of the first user message.
const TITLE_LEN: usize = 40;

/// Current Unix epoch in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One committed message. Append-only within a turn; never mutated after
/// being committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub title: String,
    pub created_at: u64,
    pub messages: Vec<ChatMessage>,
}

impl Session {
    fn fresh() -> Self {
        Session {
            id: Uuid::new_v4(),
            title: DEFAULT_TITLE.to_string(),
            created_at: now_ms(),
            messages: Vec::new(),
        }
    }
}

/// The persisted document.
///
/// Invariant: `current_id` references a member of `sessions`, or is `None`
/// only when `sessions` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCollection {
    pub sessions: Vec<Session>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_id: Option<Uuid>,
}

impl SessionCollection {
    /// One fresh default session, selected.
    fn bootstrap() -> Self {
        let session = Session::fresh();
        let id = session.id;
        SessionCollection {
            sessions: vec![session],
            current_id: Some(id),
        }
    }

    fn contains(&self, id: Uuid) -> bool {
        self.sessions.iter().any(|s| s.id == id)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Owned, explicitly-injected session container. Reads happen against the
/// in-memory collection; every mutating operation persists the whole
/// document as its last step.
pub struct SessionStore {
    conn: Connection,
    state: SessionCollection,
}

impl SessionStore {
    /// Open (or create) the store at `path`. A missing or corrupt persisted
    /// document falls back to a fresh single default session rather than
    /// failing the caller.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// In-memory store; used by tests and by callers that do not want disk
    /// persistence.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;
        let state = match kv_get(&conn, SESSIONS_KEY) {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(state) => state,
                Err(err) => {
                    warn!(error = %err, "corrupt session document, starting fresh");
                    SessionCollection::bootstrap()
                }
            },
            None => SessionCollection::bootstrap(),
        };
        let mut store = SessionStore { conn, state };
        store.persist()?;
        Ok(store)
    }

    /// Stable client identity for the `X-Session-Id` header: generated once,
    /// persisted alongside the sessions document.
    pub fn client_session_id(&self) -> Result<String> {
        if let Some(id) = kv_get(&self.conn, CLIENT_ID_KEY) {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        kv_put(&self.conn, CLIENT_ID_KEY, &id)?;
        Ok(id)
    }

    /// The full collection (read-only).
    pub fn collection(&self) -> &SessionCollection {
        &self.state
    }

    /// The active session, if any.
    pub fn active(&self) -> Option<&Session> {
        let id = self.state.current_id?;
        self.state.sessions.iter().find(|s| s.id == id)
    }

    /// Prepend a fresh session and make it active.
    pub fn create(&mut self) -> Result<()> {
        let session = Session::fresh();
        self.state.current_id = Some(session.id);
        self.state.sessions.insert(0, session);
        self.persist()
    }

    /// Switch the active session. No-op if `id` is not in the collection.
    pub fn select(&mut self, id: Uuid) -> Result<()> {
        if !self.state.contains(id) {
            return Ok(());
        }
        self.state.current_id = Some(id);
        self.persist()
    }

    /// Remove a session. If it was active, the first remaining session
    /// becomes active, or none when the collection is now empty.
    pub fn delete(&mut self, id: Uuid) -> Result<()> {
        self.state.sessions.retain(|s| s.id != id);
        if self.state.current_id == Some(id) {
            self.state.current_id = self.state.sessions.first().map(|s| s.id);
        }
        self.persist()
    }

    /// Replace the active session's messages wholesale. Derives the title
    /// from the first user message while it is still the default; a derived
    /// title sticks across later upserts. No-op without an active session.
    pub fn upsert_active_messages(&mut self, messages: &[ChatMessage]) -> Result<()> {
        let Some(id) = self.state.current_id else {
            return Ok(());
        };
        if let Some(session) = self.state.sessions.iter_mut().find(|s| s.id == id) {
            session.messages = messages.to_vec();
            if session.title == DEFAULT_TITLE {
                if let Some(first_user) = messages.iter().find(|m| m.role == Role::User) {
                    session.title = first_user.content.chars().take(TITLE_LEN).collect();
                }
            }
        }
        self.persist()
    }

    /// Write the whole document under its fixed key.
    fn persist(&mut self) -> Result<()> {
        let raw = serde_json::to_string(&self.state)?;
        kv_put(&self.conn, SESSIONS_KEY, &raw)
    }
}

fn kv_get(conn: &Connection, key: &str) -> Option<String> {
    conn.query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .optional()
    .ok()
    .flatten()
}

fn kv_put(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    )?;
    Ok(())
}

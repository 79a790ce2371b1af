//! Client configuration and the orchestrator's fixed endpoint paths.
//!
//! Precedence: explicit TOML file < environment variables. Everything has a
//! working default so `ClientConfig::default()` talks to a local backend.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, VoxError};

/// Fixed endpoint paths exposed by the orchestrator. Base address is
/// configurable; these are not.
pub mod paths {
    pub const CHAT: &str = "/v1/chat";
    pub const CHAT_STREAM: &str = "/v1/chat/stream";
    pub const TTS_STREAM: &str = "/v1/tts/stream";
    pub const INGEST: &str = "/v1/ingest";
    pub const RETRIEVE: &str = "/v1/retrieve";
    pub const HEALTH: &str = "/v1/health";
    pub const WS_TRANSCRIBE: &str = "/v1/transcribe/ws";
}

/// Client-side configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Orchestrator base address, e.g. `http://localhost:8080`. A trailing
    /// slash is stripped on load.
    pub base_url: String,
    /// Optional bearer token attached as `Authorization` to every request.
    pub auth_token: Option<String>,
    /// Use the deterministic mock duplex transport instead of a live
    /// WebSocket (development without a reachable backend).
    pub mock_transport: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: "http://localhost:8080".to_string(),
            auth_token: None,
            mock_transport: false,
        }
    }
}

impl ClientConfig {
    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config: ClientConfig = toml::from_str(&text)
            .map_err(|e| VoxError::Config(format!("{}: {}", path.display(), e)))?;
        config.apply_env();
        config.normalize();
        Ok(config)
    }

    /// Defaults plus environment overrides — used when no config file exists.
    pub fn from_env() -> Self {
        let mut config = ClientConfig::default();
        config.apply_env();
        config.normalize();
        config
    }

    /// `VOXLINK_BASE_URL`, `VOXLINK_AUTH_TOKEN`, `VOXLINK_MOCK=1`.
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("VOXLINK_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(token) = std::env::var("VOXLINK_AUTH_TOKEN") {
            if !token.is_empty() {
                self.auth_token = Some(token);
            }
        }
        if let Ok(mock) = std::env::var("VOXLINK_MOCK") {
            self.mock_transport = mock == "1" || mock.eq_ignore_ascii_case("true");
        }
    }

    fn normalize(&mut self) {
        while self.base_url.ends_with('/') {
            self.base_url.pop();
        }
    }

    /// Absolute URL for a fixed endpoint path.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

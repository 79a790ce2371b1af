//! Request identity headers.
//!
//! Every outbound HTTP request carries:
//! - `X-Session-Id`   — stable client identity, generated once and persisted
//! - `X-Request-Id`   — fresh per request
//! - `X-Correlation-Id` — fresh per logical user action unless supplied
//! - `Authorization: Bearer <token>` — only when configured

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use uuid::Uuid;

pub const X_SESSION_ID: &str = "x-session-id";
pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_CORRELATION_ID: &str = "x-correlation-id";

/// Build the identity header set for one outbound request.
///
/// `session_id` comes from the persisted store (see
/// [`crate::session::SessionStore::client_session_id`]). `correlation_id`
/// groups requests belonging to one logical user action; pass `None` to mint
/// a fresh one.
pub fn build_headers(
    session_id: &str,
    correlation_id: Option<&str>,
    auth_token: Option<&str>,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(&mut headers, X_SESSION_ID, session_id);
    insert(&mut headers, X_REQUEST_ID, &Uuid::new_v4().to_string());
    let correlation = correlation_id
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    insert(&mut headers, X_CORRELATION_ID, &correlation);
    if let Some(token) = auth_token {
        if !token.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }
    }
    headers
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

//! Bearer token extraction for the WebSocket upgrade.
//!
//! The relay only checks that a token is present; validating it belongs to
//! whatever sits in front of the relay.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

const BEARER_PREFIX: &str = "bearer ";

/// Token from an `Authorization: Bearer <token>` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let prefix = value.get(..BEARER_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(BEARER_PREFIX) {
        return None;
    }
    let token = value[BEARER_PREFIX.len()..].trim();
    (!token.is_empty()).then_some(token)
}

/// Whether an upgrade carrying `headers` may proceed.
pub fn is_authorized(headers: &HeaderMap, require_bearer: bool) -> bool {
    !require_bearer || bearer_token(headers).is_some()
}

//! Session token persistence.
//!
//! The store is the single owner of the bearer token. Native clients use
//! [`MemoryTokenStore`]; the web server builds one [`CookieTokenStore`] per
//! request from the incoming `Cookie` header and copies whatever `Set-Cookie`
//! it recorded onto the response.

use super::types::SessionToken;
use axum::http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, COOKIE, InvalidHeaderValue},
};
use sha2::{Digest, Sha256};
use std::{
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};
use thiserror::Error;

/// Cookie carrying the bearer token between browser and server.
pub const SESSION_COOKIE_NAME: &str = "access_token";
/// Cookie lifetime used when nothing else is configured.
pub const DEFAULT_SESSION_TTL_DAYS: u32 = 7;

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Session token cannot be written to a cookie: {0}")]
    InvalidToken(String),
}

/// Storage for the current session token.
///
/// `get` returns `None` once the token is missing or expired; `clear` may be
/// called any number of times. A failed `set` leaves the store unchanged.
pub trait TokenStore: Send + Sync {
    /// # Errors
    /// Returns [`StoreError::InvalidToken`] when the token cannot be persisted.
    fn set(&self, token: SessionToken, ttl_days: u32) -> Result<(), StoreError>;
    fn get(&self) -> Option<SessionToken>;
    fn clear(&self);
}

#[must_use]
pub fn ttl_seconds(ttl_days: u32) -> u64 {
    u64::from(ttl_days) * SECONDS_PER_DAY
}

/// In-process store that expires the token like a browser expires a cookie.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<(SessionToken, Instant)>>,
}

impl TokenStore for MemoryTokenStore {
    fn set(&self, token: SessionToken, ttl_days: u32) -> Result<(), StoreError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds(ttl_days));
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some((token, expires_at));
        Ok(())
    }

    fn get(&self) -> Option<SessionToken> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some((token, expires_at)) if Instant::now() < *expires_at => Some(token.clone()),
            Some(_) => {
                *slot = None;
                None
            }
            None => None,
        }
    }

    fn clear(&self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Request-scoped store backed by the `access_token` cookie.
///
/// Writes are recorded as the `Set-Cookie` value the response has to carry;
/// the last write wins.
#[derive(Debug, Default)]
pub struct CookieTokenStore {
    token: Mutex<Option<SessionToken>>,
    set_cookie: Mutex<Option<HeaderValue>>,
    secure: bool,
}

impl CookieTokenStore {
    /// Reads the session cookie (or a bearer header) from the request.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, secure: bool) -> Self {
        Self {
            token: Mutex::new(extract_session_token(headers).map(SessionToken::new)),
            set_cookie: Mutex::new(None),
            secure,
        }
    }

    /// Takes the pending `Set-Cookie` value, if the session changed.
    pub fn take_set_cookie(&self) -> Option<HeaderValue> {
        self.set_cookie
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn record(&self, cookie: HeaderValue) {
        *self.set_cookie.lock().unwrap_or_else(PoisonError::into_inner) = Some(cookie);
    }
}

impl TokenStore for CookieTokenStore {
    fn set(&self, token: SessionToken, ttl_days: u32) -> Result<(), StoreError> {
        let cookie = session_cookie(&token, ttl_days, self.secure)
            .map_err(|err| StoreError::InvalidToken(err.to_string()))?;
        self.record(cookie);
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) =
            (ttl_days > 0).then_some(token);
        Ok(())
    }

    fn get(&self) -> Option<SessionToken> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn clear(&self) {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match clear_session_cookie(self.secure) {
            Ok(cookie) => self.record(cookie),
            Err(err) => tracing::error!("Failed to build session cookie: {err}"),
        }
    }
}

/// Build an `HttpOnly` cookie for the session token.
///
/// # Errors
/// Returns an error if the token contains bytes not allowed in a header.
pub fn session_cookie(
    token: &SessionToken,
    ttl_days: u32,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl = ttl_seconds(ttl_days);
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl}",
        token.expose()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Build the cookie that removes the session token from the browser.
///
/// # Errors
/// Never fails in practice; the signature mirrors [`session_cookie`].
pub fn clear_session_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Session token from the `Cookie` header, falling back to `Authorization`.
#[must_use]
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, SESSION_COOKIE_NAME).or_else(|| extract_bearer_token(headers))
}

/// Non-empty value of the named cookie.
#[must_use]
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| val.trim().to_string())
        })
        .filter(|value| !value.is_empty())
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Hex SHA-256 of a token, used as a cache key so raw tokens are never kept
/// around as map keys.
#[must_use]
pub fn hash_session_token(token: &SessionToken) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.expose().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

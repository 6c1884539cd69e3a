//! Session state for a page render and the provider that resolves it.
//!
//! Every request starts `Pending`. The [`SessionProvider`] resolves the token
//! found in the store into an identity (through a short-lived cache, then
//! `GET /auth/me`) and moves the state to `Authenticated` or
//! `Unauthenticated`. Only the transitions listed in
//! [`AuthStatus::transition`] are accepted.

use super::{
    exchange::IDENTITY_PATH,
    store::{DEFAULT_SESSION_TTL_DAYS, StoreError, TokenStore, hash_session_token},
    types::{Session, SessionToken, UserIdentity},
};
use crate::client::{ApiClient, SessionListener};
use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, instrument};

/// How long a resolved identity is reused before asking the backend again.
pub const DEFAULT_IDENTITY_CACHE_SECONDS: u64 = 60;

#[derive(Clone, Debug, Default)]
pub enum AuthStatus {
    #[default]
    Pending,
    Authenticated(Session),
    Unauthenticated,
}

#[derive(Clone, Debug)]
pub enum AuthEvent {
    Resolved(Session),
    ResolutionFailed,
    SignedOut,
    Unauthorized,
}

impl AuthEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Resolved(_) => "resolved",
            Self::ResolutionFailed => "resolution_failed",
            Self::SignedOut => "signed_out",
            Self::Unauthorized => "unauthorized",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("cannot apply {event} while {state}")]
pub struct TransitionError {
    pub state: &'static str,
    pub event: &'static str,
}

impl AuthStatus {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authenticated(_) => "authenticated",
            Self::Unauthenticated => "unauthenticated",
        }
    }

    /// Applies an event. Rejected events leave the state unchanged.
    ///
    /// # Errors
    /// Returns `TransitionError` for any transition other than
    /// `Pending -> Authenticated`, `Pending -> Unauthenticated` and
    /// `Authenticated -> Unauthenticated`.
    pub fn transition(&mut self, event: AuthEvent) -> Result<(), TransitionError> {
        let next = match (&*self, event) {
            (Self::Pending, AuthEvent::Resolved(session)) => Self::Authenticated(session),
            (Self::Pending, AuthEvent::ResolutionFailed)
            | (Self::Authenticated(_), AuthEvent::SignedOut | AuthEvent::Unauthorized) => {
                Self::Unauthenticated
            }
            (state, event) => {
                return Err(TransitionError {
                    state: state.name(),
                    event: event.name(),
                });
            }
        };
        *self = next;
        Ok(())
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

struct CachedIdentity {
    identity: UserIdentity,
    expires_at: Instant,
}

/// Owns identity resolution for every request.
///
/// Cached identities are keyed by the token hash and evicted on sign-out or
/// when the backend rejects the token.
pub struct SessionProvider {
    cache: RwLock<HashMap<String, CachedIdentity>>,
    cache_ttl: Duration,
    session_ttl_days: u32,
}

impl Default for SessionProvider {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL_DAYS)
    }
}

impl SessionProvider {
    #[must_use]
    pub fn new(session_ttl_days: u32) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            cache_ttl: Duration::from_secs(DEFAULT_IDENTITY_CACHE_SECONDS),
            session_ttl_days,
        }
    }

    #[must_use]
    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    #[must_use]
    pub fn session_ttl_days(&self) -> u32 {
        self.session_ttl_days
    }

    /// Resolves the token held by the client's store.
    ///
    /// A rejected token runs through the client's interceptors, so a `401`
    /// also clears the store.
    #[instrument(skip_all)]
    pub async fn resolve(&self, api: &ApiClient) -> AuthStatus {
        let mut status = AuthStatus::Pending;
        let event = match api.store().get() {
            None => AuthEvent::ResolutionFailed,
            Some(token) => match self.cached(&token) {
                Some(identity) => AuthEvent::Resolved(Session::new(token, identity)),
                None => match api.get::<UserIdentity>(IDENTITY_PATH).await {
                    Ok(identity) => {
                        self.remember(&token, &identity);
                        AuthEvent::Resolved(Session::new(token, identity))
                    }
                    Err(err) => {
                        debug!("Session did not resolve: {err}");
                        AuthEvent::ResolutionFailed
                    }
                },
            },
        };
        // Pending accepts both events.
        let _ = status.transition(event);
        status
    }

    /// Persists a freshly exchanged session. Nothing is cached when the store
    /// refuses the token.
    ///
    /// # Errors
    /// Returns the store's error unchanged.
    pub fn establish(&self, store: &dyn TokenStore, session: &Session) -> Result<(), StoreError> {
        store.set(session.token.clone(), self.session_ttl_days)?;
        self.remember(&session.token, &session.identity);
        Ok(())
    }

    /// Clears the store and forgets the cached identity.
    pub fn sign_out(&self, store: &dyn TokenStore) {
        if let Some(token) = store.get() {
            self.forget(&token);
        }
        store.clear();
    }

    pub fn forget(&self, token: &SessionToken) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&hash_session_token(token));
    }

    fn cached(&self, token: &SessionToken) -> Option<UserIdentity> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(&hash_session_token(token))
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.identity.clone())
    }

    fn remember(&self, token: &SessionToken, identity: &UserIdentity) {
        let now = Instant::now();
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|_, entry| now < entry.expires_at);
        cache.insert(
            hash_session_token(token),
            CachedIdentity {
                identity: identity.clone(),
                expires_at: now + self.cache_ttl,
            },
        );
    }
}

impl SessionListener for SessionProvider {
    fn session_invalidated(&self, token: &SessionToken) {
        self.forget(token);
    }
}

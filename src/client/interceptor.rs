//! Response interception shared by every outbound backend call.
//!
//! The redirect-on-401 policy lives here and nowhere else: the gateway hands
//! each response status to its interceptors before decoding the body, and the
//! [`UnauthorizedInterceptor`] turns a `401` into a cleared token store plus a
//! navigation to the sign-in page.

use super::errors::ApiError;
use crate::features::auth::{store::TokenStore, types::SessionToken};
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};
use tracing::warn;

/// Sign-in page the client navigates to when the backend rejects a token.
pub const SIGN_IN_PATH: &str = "/auth/signin";

/// Client-side navigation sink.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Observer notified when a token has been rejected by the backend.
pub trait SessionListener: Send + Sync {
    fn session_invalidated(&self, token: &SessionToken);
}

/// Hook run on every response status before the body is read.
///
/// Returning `Some` short-circuits the call with that error.
pub trait ResponseInterceptor: Send + Sync {
    fn intercept(&self, status: u16, store: &dyn TokenStore) -> Option<ApiError>;
}

/// Clears the session and navigates to sign-in when the backend answers `401`.
pub struct UnauthorizedInterceptor {
    navigator: Arc<dyn Navigator>,
    listeners: Vec<Arc<dyn SessionListener>>,
}

impl UnauthorizedInterceptor {
    #[must_use]
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self {
            navigator,
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listeners.push(listener);
        self
    }
}

impl ResponseInterceptor for UnauthorizedInterceptor {
    fn intercept(&self, status: u16, store: &dyn TokenStore) -> Option<ApiError> {
        if status != 401 {
            return None;
        }

        warn!("Backend rejected the session token, signing out");
        if let Some(token) = store.get() {
            for listener in &self.listeners {
                listener.session_invalidated(&token);
            }
        }
        store.clear();
        self.navigator.navigate(SIGN_IN_PATH);

        Some(ApiError::Unauthorized)
    }
}

/// Navigator that records the requested target so a server handler can turn
/// it into a redirect once the call returns.
#[derive(Debug, Default)]
pub struct PendingNavigation {
    target: Mutex<Option<String>>,
    count: AtomicUsize,
}

impl PendingNavigation {
    /// Takes the recorded target, leaving nothing pending.
    pub fn take(&self) -> Option<String> {
        self.target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    #[must_use]
    pub fn target(&self) -> Option<String> {
        self.target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of navigations requested so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Navigator for PendingNavigation {
    fn navigate(&self, path: &str) {
        self.count.fetch_add(1, Ordering::SeqCst);
        *self.target.lock().unwrap_or_else(PoisonError::into_inner) = Some(path.to_string());
    }
}

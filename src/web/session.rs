//! Per-request session wiring.
//!
//! [`RequestSession`] builds a cookie-backed token store for the incoming
//! request and a gateway client whose `401` interceptor clears that store,
//! evicts the cached identity and records a navigation to sign-in. Handlers
//! finish their response through it so the resulting `Set-Cookie` and
//! redirect are applied.

use super::{pages, state::AppState};
use crate::{
    client::{ApiClient, PendingNavigation, SIGN_IN_PATH, UnauthorizedInterceptor},
    features::auth::{
        guards::{Decision, RouteGuard, sign_in_redirect},
        state::AuthStatus,
        store::{CookieTokenStore, StoreError, TokenStore},
        types::Session,
    },
};
use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header::SET_COOKIE, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::error;

pub struct RequestSession {
    state: Arc<AppState>,
    store: Arc<CookieTokenStore>,
    navigation: Arc<PendingNavigation>,
    api: ApiClient,
    requested_path: String,
}

impl<S> FromRequestParts<S> for RequestSession
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(state) = parts.extensions.get::<Arc<AppState>>().cloned() else {
            error!("AppState extension missing from router");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, "Server misconfigured"));
        };
        let requested_path = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);
        Ok(Self::new(state, &parts.headers, requested_path))
    }
}

impl RequestSession {
    #[must_use]
    pub fn new(
        state: Arc<AppState>,
        headers: &axum::http::HeaderMap,
        requested_path: String,
    ) -> Self {
        let store = Arc::new(CookieTokenStore::from_headers(
            headers,
            state.web().session_cookie_secure(),
        ));
        let navigation = Arc::new(PendingNavigation::default());
        let interceptor = UnauthorizedInterceptor::new(navigation.clone())
            .with_listener(state.sessions().clone());
        let api = ApiClient::from_parts(
            state.http().clone(),
            state.client_config().clone(),
            store.clone(),
        )
        .with_interceptor(Arc::new(interceptor));

        Self {
            state,
            store,
            navigation,
            api,
            requested_path,
        }
    }

    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Gateway client bound to this request's session.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub fn has_token(&self) -> bool {
        self.store.get().is_some()
    }

    pub async fn status(&self) -> AuthStatus {
        self.state.sessions().resolve(&self.api).await
    }

    /// Resolves the session and applies the guard.
    ///
    /// # Errors
    /// Returns the response to send instead of the page: a redirect to
    /// sign-in or `/unauthorized`, or a placeholder.
    pub async fn guard(&self, guard: RouteGuard) -> Result<Session, Response> {
        let status = self.status().await;
        match guard.decide(&status, &self.requested_path) {
            Decision::Render(session) => Ok(session.clone()),
            Decision::Redirect(target) => Err(self.redirect(&target)),
            Decision::Placeholder => {
                Err(self.finish((StatusCode::SERVICE_UNAVAILABLE, pages::placeholder())))
            }
        }
    }

    /// Stores a freshly exchanged session in the cookie.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the token cannot be carried by a cookie;
    /// no `Set-Cookie` is recorded then.
    pub fn establish(&self, session: &Session) -> Result<(), StoreError> {
        self.state.sessions().establish(self.store.as_ref(), session)
    }

    pub fn sign_out(&self) {
        self.state.sessions().sign_out(self.store.as_ref());
    }

    /// Applies the pending cookie, and turns a navigation requested by the
    /// `401` interceptor into a redirect back through sign-in.
    pub fn finish(&self, response: impl IntoResponse) -> Response {
        match self.navigation.take() {
            Some(target) if target == SIGN_IN_PATH => {
                self.with_cookie(Redirect::to(&sign_in_redirect(&self.requested_path)))
            }
            Some(target) => self.with_cookie(Redirect::to(&target)),
            None => self.with_cookie(response),
        }
    }

    /// Applies the pending cookie without converting navigations; used by the
    /// JSON routes, whose callers handle `401` themselves.
    pub fn finish_api(&self, response: impl IntoResponse) -> Response {
        self.navigation.take();
        self.with_cookie(response)
    }

    /// `303 See Other` to `target`, carrying the pending cookie.
    pub fn redirect(&self, target: &str) -> Response {
        self.navigation.take();
        self.with_cookie(Redirect::to(target))
    }

    fn with_cookie(&self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if let Some(cookie) = self.store.take_set_cookie() {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        response
    }
}

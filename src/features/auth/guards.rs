//! Route guard: decides per page whether to render, wait or redirect.
//!
//! UX only; the backend still authorizes every call made on the user's behalf.

use super::{state::AuthStatus, types::Session};
use crate::client::SIGN_IN_PATH;
use url::form_urlencoded;

/// View shown to signed-in users that lack the required role.
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";
/// Where a successful sign-in lands when no callback was requested.
pub const DEFAULT_CALLBACK_PATH: &str = "/dashboard";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Admin,
}

#[derive(Debug)]
pub enum Decision<'a> {
    /// Session still resolving; show a placeholder, never protected content.
    Placeholder,
    Render(&'a Session),
    Redirect(String),
}

#[derive(Clone, Copy, Debug)]
pub struct RouteGuard {
    requirement: Requirement,
}

impl RouteGuard {
    #[must_use]
    pub fn require_auth() -> Self {
        Self {
            requirement: Requirement::Authenticated,
        }
    }

    #[must_use]
    pub fn require_admin() -> Self {
        Self {
            requirement: Requirement::Admin,
        }
    }

    #[must_use]
    pub fn requirement(&self) -> Requirement {
        self.requirement
    }

    /// `requested_path` becomes the sign-in `callbackUrl`.
    #[must_use]
    pub fn decide<'a>(&self, status: &'a AuthStatus, requested_path: &str) -> Decision<'a> {
        match status {
            AuthStatus::Pending => Decision::Placeholder,
            AuthStatus::Unauthenticated => Decision::Redirect(sign_in_redirect(requested_path)),
            AuthStatus::Authenticated(session) => match self.requirement {
                Requirement::Admin if !session.is_admin() => {
                    Decision::Redirect(UNAUTHORIZED_PATH.to_string())
                }
                _ => Decision::Render(session),
            },
        }
    }
}

/// Sign-in URL that returns to `requested_path` afterwards.
#[must_use]
pub fn sign_in_redirect(requested_path: &str) -> String {
    let callback = sanitize_callback(Some(requested_path));
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("callbackUrl", &callback)
        .finish();
    format!("{SIGN_IN_PATH}?{query}")
}

/// Only same-site absolute paths are accepted as callbacks.
#[must_use]
pub fn sanitize_callback(callback: Option<&str>) -> String {
    match callback.map(str::trim) {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.starts_with("/\\")
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => DEFAULT_CALLBACK_PATH.to_string(),
    }
}

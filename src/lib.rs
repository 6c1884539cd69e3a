//! # Quizdesk (web front for the quiz testing platform)
//!
//! `quizdesk` renders the sign-in, registration, dashboard and test catalogue
//! pages of the quiz platform and talks to the REST backend on the browser's
//! behalf. Everything it knows about a user comes from that backend; it owns
//! no database.
//!
//! ## Session Bridge
//!
//! The interesting part is the bridge between a login and the bearer token the
//! backend issues for it:
//!
//! 1. **Credential Exchange** (`features::auth::exchange`): `POST /auth/login`,
//!    then `GET /auth/me` with the new token, yielding a `Session`.
//! 2. **Session Store** (`features::auth::store`): the token lives in an
//!    `HttpOnly` cookie (7 days by default) and nowhere else.
//! 3. **API Gateway Client** (`client`): every backend call reads the token
//!    from the store and sends it as `Authorization: Bearer`. A `401` clears the
//!    store and navigates to the sign-in page through a single interceptor.
//! 4. **Route Guard** (`features::auth::guards`): pages consult the session
//!    state before rendering and redirect to sign-in with a `callbackUrl`.
//!
//! The token is never decoded here. Whether it is still valid is decided by
//! the backend on every call.

pub mod cli;
pub mod client;
pub mod features;
pub mod web;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

//! Authentication and session bridge.
//!
//! Flow summary:
//! - Sign-in: `exchange::CredentialExchange::sign_in` posts the credentials to
//!   `/auth/login`, then resolves the token with `/auth/me`.
//! - Registration: form rules in `validation`, then `/auth/register`, then the
//!   same sign-in.
//! - OAuth: `providers::OAuthProvider` trades an authorization code for the
//!   provider token and normalizes it into the same `Session`.
//! - Persistence: `state::SessionProvider::establish` writes the token into a
//!   `store::TokenStore` (the `access_token` cookie on the web server).
//! - Rendering: `state::SessionProvider::resolve` yields an `AuthStatus`, and
//!   `guards::RouteGuard` turns it into render, placeholder or redirect.
//!
//! Tokens stay opaque. Passwords and tokens are `SecretString`s and are never
//! logged.

pub mod exchange;
pub mod guards;
pub mod providers;
pub mod state;
pub mod store;
pub mod types;
pub mod validation;

pub use exchange::{CredentialExchange, ExchangeError, RegisterError};
pub use guards::{Decision, Requirement, RouteGuard};
pub use providers::{Assertion, IdentityProvider, OAuthConfig, ProviderRegistry};
pub use state::{AuthEvent, AuthStatus, SessionProvider, TransitionError};
pub use store::{CookieTokenStore, MemoryTokenStore, StoreError, TokenStore};
pub use types::{Credentials, Session, SessionToken, UserIdentity};

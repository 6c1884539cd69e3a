//! Identity providers.
//!
//! Each way of proving who you are (email and password, an OAuth 2.0
//! authorization code) is one [`IdentityProvider`]. Every provider yields the
//! same [`Session`] shape, so nothing downstream of sign-in cares which one
//! was used.

use super::{
    exchange::{CredentialExchange, ExchangeError},
    types::{Credentials, Session, SessionToken, UserIdentity, optional_string_or_number},
};
use crate::client::gateway::map_request_error;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::{collections::BTreeMap, fmt, future::Future, pin::Pin, sync::Arc};
use tracing::{info, instrument, warn};
use url::Url;

pub const CREDENTIALS_PROVIDER_ID: &str = "credentials";

/// Proof of identity handed to a provider.
pub enum Assertion {
    Credentials(Credentials),
    AuthorizationCode { code: String, redirect_uri: String },
}

impl fmt::Debug for Assertion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credentials(credentials) => formatter
                .debug_tuple("Credentials")
                .field(&credentials.email)
                .finish(),
            Self::AuthorizationCode { redirect_uri, .. } => formatter
                .debug_struct("AuthorizationCode")
                .field("redirect_uri", redirect_uri)
                .finish_non_exhaustive(),
        }
    }
}

pub type ProviderFuture<'a> = Pin<Box<dyn Future<Output = Result<Session, ExchangeError>> + Send + 'a>>;

pub trait IdentityProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Where to send the browser to start the flow, for redirect-based
    /// providers.
    fn authorization_url(&self, _state: &str, _redirect_uri: &str) -> Option<String> {
        None
    }

    fn authenticate<'a>(&'a self, assertion: &'a Assertion) -> ProviderFuture<'a>;
}

/// Email and password against the backend.
pub struct CredentialsProvider {
    exchange: CredentialExchange,
}

impl CredentialsProvider {
    #[must_use]
    pub fn new(exchange: CredentialExchange) -> Self {
        Self { exchange }
    }
}

impl IdentityProvider for CredentialsProvider {
    fn id(&self) -> &str {
        CREDENTIALS_PROVIDER_ID
    }

    fn authenticate<'a>(&'a self, assertion: &'a Assertion) -> ProviderFuture<'a> {
        Box::pin(async move {
            match assertion {
                Assertion::Credentials(credentials) => self.exchange.sign_in(credentials).await,
                Assertion::AuthorizationCode { .. } => Err(ExchangeError::UnsupportedAssertion(
                    CREDENTIALS_PROVIDER_ID.to_string(),
                )),
            }
        })
    }
}

/// Endpoints and client registration of an OAuth 2.0 provider.
#[derive(Clone)]
pub struct OAuthConfig {
    pub id: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OAuthConfig")
            .field("id", &self.id)
            .field("client_id", &self.client_id)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("userinfo_url", &self.userinfo_url)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl OAuthConfig {
    /// Google endpoints with the `openid email profile` scopes.
    #[must_use]
    pub fn google(client_id: String, client_secret: SecretString) -> Self {
        Self {
            id: "google".to_string(),
            client_id,
            client_secret,
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    #[serde(default, deserialize_with = "optional_string_or_number")]
    sub: Option<String>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Authorization-code flow against an external provider.
///
/// The provider's access token becomes the session token. Provider users are
/// never admins.
pub struct OAuthProvider {
    http: Client,
    config: OAuthConfig,
}

impl OAuthProvider {
    #[must_use]
    pub fn new(http: Client, config: OAuthConfig) -> Self {
        Self { http, config }
    }

    #[instrument(skip_all, fields(provider = %self.config.id))]
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Session, ExchangeError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
        ];
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|err| ExchangeError::Transport(map_request_error(err).to_string()))?;
        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), "Code exchange refused");
            return Err(ExchangeError::Provider("code exchange refused".to_string()));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| ExchangeError::Provider(format!("invalid token response: {err}")))?;

        let response = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|err| ExchangeError::Transport(map_request_error(err).to_string()))?;
        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), "Userinfo lookup refused");
            return Err(ExchangeError::Provider("userinfo lookup refused".to_string()));
        }
        let user: UserInfo = response
            .json()
            .await
            .map_err(|err| ExchangeError::Provider(format!("invalid userinfo: {err}")))?;

        let session = normalize_oauth(token.access_token, user)?;
        info!(user_id = %session.identity.id, "Signed in with provider");
        Ok(session)
    }
}

fn normalize_oauth(access_token: String, user: UserInfo) -> Result<Session, ExchangeError> {
    let token = SessionToken::new(access_token);
    if token.is_empty() {
        return Err(ExchangeError::Provider("empty access token".to_string()));
    }
    let email = user
        .email
        .filter(|email| !email.trim().is_empty())
        .ok_or_else(|| ExchangeError::Provider("provider returned no email".to_string()))?;
    let id = user.sub.or(user.id).unwrap_or_default();

    Ok(Session::new(
        token,
        UserIdentity {
            id,
            email: email.clone(),
            is_admin: false,
        }
        .or_signed_in_as(&email),
    ))
}

impl IdentityProvider for OAuthProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> Option<String> {
        let mut url = Url::parse(&self.config.authorize_url).ok()?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state);
        Some(url.into())
    }

    fn authenticate<'a>(&'a self, assertion: &'a Assertion) -> ProviderFuture<'a> {
        Box::pin(async move {
            match assertion {
                Assertion::AuthorizationCode { code, redirect_uri } => {
                    self.exchange_code(code, redirect_uri).await
                }
                Assertion::Credentials(_) => {
                    Err(ExchangeError::UnsupportedAssertion(self.config.id.clone()))
                }
            }
        })
    }
}

/// Providers available for sign-in, keyed by id.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.insert(provider.id().to_string(), provider);
        self
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn IdentityProvider>> {
        self.providers.get(id).cloned()
    }

    /// Ids of the redirect-based providers, for sign-in buttons.
    #[must_use]
    pub fn oauth_ids(&self) -> Vec<String> {
        self.providers
            .keys()
            .filter(|id| id.as_str() != CREDENTIALS_PROVIDER_ID)
            .cloned()
            .collect()
    }
}

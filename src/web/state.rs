//! Shared server state. Cheap to clone; handlers receive it as an
//! `Extension<Arc<AppState>>`.

use crate::{
    client::{ApiError, ClientConfig, build_http_client},
    features::auth::{
        CredentialExchange, ProviderRegistry, SessionProvider,
        providers::{CredentialsProvider, OAuthConfig, OAuthProvider},
        store::DEFAULT_SESSION_TTL_DAYS,
    },
};
use reqwest::Client;
use std::sync::Arc;

pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";

/// Settings of the web surface itself, as opposed to the backend client.
#[derive(Clone, Debug)]
pub struct WebConfig {
    public_url: String,
    session_ttl_days: u32,
    session_cookie_secure: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            public_url: DEFAULT_PUBLIC_URL.to_string(),
            session_ttl_days: DEFAULT_SESSION_TTL_DAYS,
            session_cookie_secure: false,
        }
    }
}

impl WebConfig {
    #[must_use]
    pub fn with_public_url(mut self, public_url: String) -> Self {
        self.public_url = public_url.trim().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_session_ttl_days(mut self, days: u32) -> Self {
        self.session_ttl_days = days;
        self
    }

    #[must_use]
    pub fn with_session_cookie_secure(mut self, secure: bool) -> Self {
        self.session_cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    #[must_use]
    pub fn session_ttl_days(&self) -> u32 {
        self.session_ttl_days
    }

    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.session_cookie_secure
    }

    /// Callback URL registered with an OAuth provider.
    #[must_use]
    pub fn oauth_redirect_uri(&self, provider: &str) -> String {
        format!("{}/auth/oauth/{provider}/callback", self.public_url)
    }
}

pub struct AppState {
    http: Client,
    client_config: ClientConfig,
    web: WebConfig,
    exchange: CredentialExchange,
    sessions: Arc<SessionProvider>,
    providers: ProviderRegistry,
}

impl AppState {
    /// Builds the state with the credentials provider registered.
    ///
    /// # Errors
    /// Returns `ApiError::Config` if the HTTP client cannot be initialized.
    pub fn new(client_config: ClientConfig, web: WebConfig) -> Result<Self, ApiError> {
        let http = build_http_client(&client_config)?;
        let exchange = CredentialExchange::new(http.clone(), client_config.clone());
        let providers = ProviderRegistry::default()
            .with_provider(Arc::new(CredentialsProvider::new(exchange.clone())));
        let sessions = Arc::new(SessionProvider::new(web.session_ttl_days()));

        Ok(Self {
            http,
            client_config,
            web,
            exchange,
            sessions,
            providers,
        })
    }

    #[must_use]
    pub fn with_oauth(mut self, config: OAuthConfig) -> Self {
        let provider = OAuthProvider::new(self.http.clone(), config);
        self.providers = self.providers.with_provider(Arc::new(provider));
        self
    }

    #[must_use]
    pub fn with_session_provider(mut self, sessions: SessionProvider) -> Self {
        self.sessions = Arc::new(sessions);
        self
    }

    #[must_use]
    pub fn http(&self) -> &Client {
        &self.http
    }

    #[must_use]
    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    #[must_use]
    pub fn web(&self) -> &WebConfig {
        &self.web
    }

    #[must_use]
    pub fn exchange(&self) -> &CredentialExchange {
        &self.exchange
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionProvider> {
        &self.sessions
    }

    #[must_use]
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }
}

//! Credential exchange: turns an email and password into a backend session.
//!
//! Sign-in is two sequential calls, `POST /auth/login` for the token and
//! `GET /auth/me` with that token for the identity. Both run under a single
//! deadline, and dropping the returned future cancels whichever call is in
//! flight. Nothing is persisted here; the caller decides whether the session
//! goes into a store.

use super::{
    store::{DEFAULT_SESSION_TTL_DAYS, MemoryTokenStore, StoreError, TokenStore},
    types::{
        Credentials, LoginRequest, LoginResponse, RegisterRequest, RegisteredUser,
        RegistrationResponse, Session, SessionToken, UserIdentity,
    },
};
use crate::client::{ApiClient, ApiError, ClientConfig, ErrorKind, FieldErrors};
use reqwest::Client;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub const LOGIN_PATH: &str = "/auth/login";
pub const IDENTITY_PATH: &str = "/auth/me";
pub const REGISTER_PATH: &str = "/auth/register";

/// Why a sign-in attempt was denied.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Signed in but the identity could not be loaded")]
    IdentityUnavailable,
    #[error("Backend unreachable: {0}")]
    Transport(String),
    #[error("Sign-in did not complete in time")]
    Timeout,
    #[error("Unsupported assertion for provider {0}")]
    UnsupportedAssertion(String),
    #[error("Identity provider failed: {0}")]
    Provider(String),
    #[error(transparent)]
    Session(#[from] StoreError),
}

impl ExchangeError {
    /// Code understood by the auth error page.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials | Self::IdentityUnavailable => "CredentialsSignin",
            Self::UnsupportedAssertion(_) => "OAuthSignin",
            Self::Provider(_) => "OAuthCallback",
            Self::Transport(_) | Self::Timeout | Self::Session(_) => "Default",
        }
    }

    /// Banner text. Both denial variants collapse into the same message.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidCredentials | Self::IdentityUnavailable => "Invalid email or password",
            Self::UnsupportedAssertion(_) | Self::Provider(_) => {
                "Could not sign in with this provider. Please try again."
            }
            Self::Transport(_) | Self::Timeout | Self::Session(_) => {
                "Something went wrong. Please try again."
            }
        }
    }
}

/// Why a registration attempt failed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("Registration form is invalid")]
    Validation(FieldErrors),
    #[error("User with this email already exists")]
    Conflict,
    #[error("Registration rejected: {0}")]
    Rejected(String),
    #[error("Backend unreachable: {0}")]
    Transport(String),
    #[error("Registered but sign-in failed: {0}")]
    SignIn(ExchangeError),
}

impl RegisterError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict => ErrorKind::Conflict,
            Self::SignIn(_) => ErrorKind::Authentication,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Rejected(_) => ErrorKind::Server,
        }
    }

    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(_) => "Please check the highlighted fields.".to_string(),
            Self::Conflict => {
                "An account with this email already exists. Please sign in instead.".to_string()
            }
            Self::Rejected(message) => message.clone(),
            Self::Transport(_) => "Something went wrong. Please try again.".to_string(),
            Self::SignIn(_) => {
                "Your account was created, but signing in failed. Please sign in.".to_string()
            }
        }
    }

    #[must_use]
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Backend messages that mean "this email is taken" even without a `409`.
const DUPLICATE_EMAIL_MARKERS: [&str; 3] =
    ["emailalreadyexists", "already registered", "already exists"];

/// Login and registration against the backend auth endpoints.
#[derive(Clone)]
pub struct CredentialExchange {
    http: Client,
    config: ClientConfig,
    deadline: Duration,
}

impl CredentialExchange {
    /// The deadline defaults to the per-request timeout.
    #[must_use]
    pub fn new(http: Client, config: ClientConfig) -> Self {
        let deadline = config.timeout();
        Self {
            http,
            config,
            deadline,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Client bound to a private store so a `401` here never signs anybody
    /// out; it only means the credentials were refused.
    fn scratch_client(&self) -> (ApiClient, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::default());
        let client = ApiClient::from_parts(self.http.clone(), self.config.clone(), store.clone());
        (client, store)
    }

    /// Exchanges credentials for a session.
    ///
    /// # Errors
    /// - `InvalidCredentials` when the backend refuses the login.
    /// - `IdentityUnavailable` when the token does not resolve to a user.
    /// - `Transport`/`Timeout` when the backend did not answer in time.
    #[instrument(skip_all)]
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session, ExchangeError> {
        match tokio::time::timeout(self.deadline, self.exchange(credentials)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Sign-in exceeded its deadline of {:?}", self.deadline);
                Err(ExchangeError::Timeout)
            }
        }
    }

    async fn exchange(&self, credentials: &Credentials) -> Result<Session, ExchangeError> {
        let (client, store) = self.scratch_client();
        let request = LoginRequest {
            email: &credentials.email,
            password: credentials.password(),
        };

        let login: LoginResponse = client
            .post(LOGIN_PATH, &request)
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::Transport => ExchangeError::Transport(err.to_string()),
                _ => {
                    debug!("Login refused: {err}");
                    ExchangeError::InvalidCredentials
                }
            })?;

        let token = SessionToken::new(login.access_token);
        if token.is_empty() {
            return Err(ExchangeError::InvalidCredentials);
        }

        store.set(token.clone(), DEFAULT_SESSION_TTL_DAYS)?;
        let identity = client
            .get::<UserIdentity>(IDENTITY_PATH)
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::Transport => ExchangeError::Transport(err.to_string()),
                _ => {
                    warn!("Token issued but identity lookup failed: {err}");
                    ExchangeError::IdentityUnavailable
                }
            })?
            .or_signed_in_as(&credentials.email);

        info!(user_id = %identity.id, "Signed in");
        Ok(Session::new(token, identity))
    }

    /// Creates an account. The form is expected to be validated already.
    ///
    /// # Errors
    /// See [`RegisterError`].
    #[instrument(skip_all)]
    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisteredUser, RegisterError> {
        let (client, _) = self.scratch_client();
        let response: RegistrationResponse = client
            .post(REGISTER_PATH, request)
            .await
            .map_err(classify_registration_error)?;
        let user = RegisteredUser::from(response);
        info!(user_id = ?user.id, "Account registered");
        Ok(user)
    }

    /// Registers and then signs in with the same credentials.
    ///
    /// # Errors
    /// Registration failures as in [`CredentialExchange::register`];
    /// `RegisterError::SignIn` when the account exists but sign-in failed.
    pub async fn register_and_sign_in(
        &self,
        request: &RegisterRequest,
    ) -> Result<Session, RegisterError> {
        self.register(request).await?;
        self.sign_in(&request.credentials())
            .await
            .map_err(RegisterError::SignIn)
    }
}

fn classify_registration_error(err: ApiError) -> RegisterError {
    match err {
        ApiError::Http { status: 409, .. } => RegisterError::Conflict,
        ApiError::Http {
            status: 400 | 422,
            message,
            details,
        } => {
            let lowered = message.to_lowercase();
            if DUPLICATE_EMAIL_MARKERS
                .iter()
                .any(|marker| lowered.contains(marker))
            {
                RegisterError::Conflict
            } else if details.is_empty() {
                RegisterError::Rejected(message)
            } else {
                RegisterError::Validation(details)
            }
        }
        other if other.kind() == ErrorKind::Transport => RegisterError::Transport(other.to_string()),
        other => {
            warn!("Registration failed: {other}");
            RegisterError::Rejected(other.user_message())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::build_http_client;
    use anyhow::Result;
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn exchange_for(server: &MockServer) -> Result<CredentialExchange> {
        let config = ClientConfig::new(server.uri());
        let http = build_http_client(&config)?;
        Ok(CredentialExchange::new(http, config))
    }

    async fn mount_login(server: &MockServer, token: &str) {
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_json(json!({"email": "a@b.com", "password": "Aa1!aaaa"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": token, "token_type": "bearer"})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn sign_in_returns_token_and_identity() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        mount_login(&server, "tok-1").await;
        Mock::given(method("GET"))
            .and(path(IDENTITY_PATH))
            .and(header("Authorization", "Bearer tok-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": 1, "email": "a@b.com", "is_admin": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let exchange = exchange_for(&server)?;
        let session = exchange
            .sign_in(&Credentials::new("a@b.com", "Aa1!aaaa"))
            .await?;

        assert_eq!(session.token.expose(), "tok-1");
        assert_eq!(session.identity.email, "a@b.com");
        assert_eq!(session.identity.id, "1");
        assert!(session.is_admin());
        Ok(())
    }

    #[tokio::test]
    async fn rejected_login_is_invalid_credentials() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"detail": "Incorrect email or password"})),
            )
            .mount(&server)
            .await;

        let exchange = exchange_for(&server)?;
        let result = exchange
            .sign_in(&Credentials::new("a@b.com", "wrong"))
            .await;
        assert_eq!(result.err(), Some(ExchangeError::InvalidCredentials));

        let requests = server.received_requests().await.unwrap_or_default();
        assert_eq!(requests.len(), 1, "identity must not be fetched");
        Ok(())
    }

    #[tokio::test]
    async fn identity_failure_is_distinct_from_refused_login() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        mount_login(&server, "tok-2").await;
        Mock::given(method("GET"))
            .and(path(IDENTITY_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let exchange = exchange_for(&server)?;
        let err = exchange
            .sign_in(&Credentials::new("a@b.com", "Aa1!aaaa"))
            .await
            .err();
        assert_eq!(err, Some(ExchangeError::IdentityUnavailable));
        assert_eq!(
            err.as_ref().map(ExchangeError::user_message),
            Some(ExchangeError::InvalidCredentials.user_message())
        );
        Ok(())
    }

    #[tokio::test]
    async fn slow_exchange_hits_the_deadline() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "t"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let exchange = exchange_for(&server)?.with_deadline(Duration::from_millis(100));
        let result = exchange
            .sign_in(&Credentials::new("a@b.com", "Aa1!aaaa"))
            .await;
        assert_eq!(result.err(), Some(ExchangeError::Timeout));
        Ok(())
    }

    #[tokio::test]
    async fn register_then_sign_in_yields_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REGISTER_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "message": "User registered successfully",
                "user": {"id": "9", "email": "a@b.com", "name": "Ann"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_login(&server, "tok-9").await;
        Mock::given(method("GET"))
            .and(path(IDENTITY_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "9", "email": "a@b.com"})),
            )
            .mount(&server)
            .await;

        let request = RegisterRequest {
            name: "Ann".to_string(),
            email: "a@b.com".to_string(),
            password: "Aa1!aaaa".to_string(),
        };
        let session = exchange_for(&server)?.register_and_sign_in(&request).await?;
        assert_eq!(session.token.expose(), "tok-9");
        assert!(!session.is_admin());
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_conflict() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REGISTER_PATH))
            .respond_with(
                ResponseTemplate::new(409)
                    .set_body_json(json!({"error": "User with this email already exists"})),
            )
            .mount(&server)
            .await;

        let request = RegisterRequest {
            name: "Ann".to_string(),
            email: "a@b.com".to_string(),
            password: "Aa1!aaaa".to_string(),
        };
        let result = exchange_for(&server)?.register_and_sign_in(&request).await;
        assert_eq!(result.err(), Some(RegisterError::Conflict));

        let requests = server.received_requests().await.unwrap_or_default();
        assert!(requests.iter().all(|request| request.url.path() != LOGIN_PATH));
        Ok(())
    }

    #[test]
    fn duplicate_email_400_is_a_conflict() {
        let err = classify_registration_error(ApiError::Http {
            status: 400,
            message: "Email already registered".to_string(),
            details: FieldErrors::new(),
        });
        assert_eq!(err, RegisterError::Conflict);
    }

    #[test]
    fn backend_field_details_become_validation_errors() {
        let mut details = FieldErrors::new();
        details.insert("email".to_string(), "Invalid email address".to_string());
        let err = classify_registration_error(ApiError::Http {
            status: 400,
            message: "Validation error".to_string(),
            details: details.clone(),
        });
        assert_eq!(err, RegisterError::Validation(details));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn transport_failures_stay_transport() {
        let err = classify_registration_error(ApiError::Network("refused".to_string()));
        assert!(matches!(err, RegisterError::Transport(_)));
        assert_eq!(err.user_message(), "Something went wrong. Please try again.");
    }

    #[test]
    fn error_codes_match_error_page() {
        assert_eq!(ExchangeError::InvalidCredentials.error_code(), "CredentialsSignin");
        assert_eq!(ExchangeError::Provider("x".into()).error_code(), "OAuthCallback");
        assert_eq!(ExchangeError::Timeout.error_code(), "Default");
        let unstored = ExchangeError::from(StoreError::InvalidToken("bad byte".into()));
        assert_eq!(unstored.error_code(), "Default");
        assert_eq!(unstored.user_message(), "Something went wrong. Please try again.");
    }
}

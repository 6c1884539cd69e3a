//! Request and response types for the auth endpoints. Credentials and tokens
//! are wrapped in `SecretString` so they never show up in logs or `Debug`
//! output.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Emails are compared exactly by the backend, so every form sends them
/// trimmed and lowercased.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Email and password typed into the sign-in form. Transient: never stored.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub email: String,
    password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: normalize_email(&email.into()),
            password: SecretString::from(password.into()),
        }
    }

    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// Opaque bearer token issued by the backend. Never decoded here.
#[derive(Clone, Debug)]
pub struct SessionToken(SecretString);

impl SessionToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expose().trim().is_empty()
    }
}

/// Identity document returned by `GET /auth/me`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIdentity {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl UserIdentity {
    /// Fills blank fields from the email the user signed in with.
    #[must_use]
    pub fn or_signed_in_as(mut self, email: &str) -> Self {
        if self.id.trim().is_empty() {
            self.id = email.to_string();
        }
        if self.email.trim().is_empty() {
            self.email = email.to_string();
        }
        self
    }
}

/// Token plus identity for the duration of a login.
#[derive(Clone, Debug)]
pub struct Session {
    pub token: SessionToken,
    pub identity: UserIdentity,
}

impl Session {
    #[must_use]
    pub fn new(token: SessionToken, identity: UserIdentity) -> Self {
        Self { token, identity }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.identity.is_admin
    }
}

/// Body of `POST /auth/login`.
#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Answer of `POST /auth/login`. Only the token is required; some backends
/// also echo the identity fields.
#[derive(Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: Option<bool>,
}

impl fmt::Debug for LoginResponse {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LoginResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("id", &self.id)
            .field("email", &self.email)
            .field("is_admin", &self.is_admin)
            .finish()
    }
}

/// Body of `POST /auth/register`.
#[derive(Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RegisterRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl RegisterRequest {
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.email.clone(), self.password.clone())
    }
}

/// User created by the backend, password omitted.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct RegisteredUser {
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Registration answers come either bare or wrapped as `{message, user}`.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum RegistrationResponse {
    Wrapped { user: RegisteredUser },
    Bare(RegisteredUser),
}

impl From<RegistrationResponse> for RegisteredUser {
    fn from(response: RegistrationResponse) -> Self {
        match response {
            RegistrationResponse::Wrapped { user } | RegistrationResponse::Bare(user) => user,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(text) => text,
            StringOrNumber::Number(number) => number.to_string(),
        }
    }
}

/// Accepts identifiers encoded either as JSON strings or numbers.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrNumber::deserialize(deserializer).map(String::from)
}

pub(crate) fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<StringOrNumber>::deserialize(deserializer).map(|value| value.map(String::from))
}

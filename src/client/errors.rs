//! Discriminated failures returned by the API gateway. Callers branch on
//! [`ErrorKind`] instead of inspecting raw backend responses.

use std::collections::BTreeMap;
use thiserror::Error;

/// Field name to message, as rendered next to form inputs.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Request failed ({status}): {message}")]
    Http {
        status: u16,
        message: String,
        details: FieldErrors,
    },
    #[error("Response error: {0}")]
    Parse(String),
    #[error("Request error: {0}")]
    Serialization(String),
}

/// Error taxonomy used when turning failures into page state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authentication,
    Conflict,
    Transport,
    Server,
}

impl ApiError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized => ErrorKind::Authentication,
            Self::Http { status, .. } => match status {
                401 | 403 => ErrorKind::Authentication,
                409 => ErrorKind::Conflict,
                400 | 422 => ErrorKind::Validation,
                _ => ErrorKind::Server,
            },
            Self::Network(_) | Self::Timeout(_) => ErrorKind::Transport,
            Self::Config(_) | Self::Parse(_) | Self::Serialization(_) => ErrorKind::Server,
        }
    }

    /// HTTP status carried by the failure, if the backend answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Banner text for the failure. Transport and server failures share a
    /// generic message so backend internals never reach the page.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Authentication => "Your session has expired. Please sign in again.".to_string(),
            ErrorKind::Conflict => "A user with this email already exists.".to_string(),
            ErrorKind::Validation => match self {
                Self::Http { message, .. } => message.clone(),
                _ => "Please check the highlighted fields.".to_string(),
            },
            ErrorKind::Transport | ErrorKind::Server => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

//! API gateway for the quiz backend.
//!
//! Every outbound call goes through [`ApiClient`]: it resolves the backend URL,
//! sends JSON, attaches the bearer token found in the session store and runs
//! the shared response interceptors. Callers receive either the decoded body
//! or an [`ApiError`]; raw response shapes never leak past this module.

pub mod config;
pub mod errors;
pub mod gateway;
pub mod interceptor;

pub use config::{ClientConfig, Resolution};
pub use errors::{ApiError, ErrorKind, FieldErrors};
pub use gateway::{ApiClient, build_http_client};
pub use interceptor::{
    Navigator, PendingNavigation, ResponseInterceptor, SIGN_IN_PATH, SessionListener,
    UnauthorizedInterceptor,
};

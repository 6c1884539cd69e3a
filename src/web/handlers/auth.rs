//! Sign-in, registration, sign-out and OAuth pages.

use crate::{
    client::FieldErrors,
    features::auth::{
        exchange::{ExchangeError, RegisterError},
        guards::{DEFAULT_CALLBACK_PATH, sanitize_callback, sign_in_redirect},
        providers::{Assertion, CREDENTIALS_PROVIDER_ID},
        store::cookie_value,
        types::Credentials,
        validation::{RegistrationForm, validate_registration},
    },
    web::{pages, session::RequestSession},
};
use axum::{
    Form,
    extract::{Path, Query},
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use ulid::Ulid;
use url::form_urlencoded;

const OAUTH_STATE_COOKIE: &str = "oauth_state";
const OAUTH_STATE_TTL_SECONDS: u64 = 600;

#[derive(Deserialize, Default)]
pub struct SignInQuery {
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
pub struct SignInForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ErrorQuery {
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct OAuthStartQuery {
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct OAuthCallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

fn error_redirect(code: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("error", code)
        .finish();
    format!("/auth/error?{query}")
}

pub async fn sign_in_page(
    session: RequestSession,
    Query(query): Query<SignInQuery>,
) -> Response {
    let callback_url = sanitize_callback(query.callback_url.as_deref());
    let error = query
        .error
        .as_deref()
        .map(|code| pages::auth_error_message(Some(code)));
    let providers = session.state().providers().oauth_ids();
    session.finish(pages::sign_in(&pages::SignInView {
        callback_url: &callback_url,
        email: "",
        error: error.as_deref(),
        providers: &providers,
    }))
}

pub async fn sign_in(session: RequestSession, Form(form): Form<SignInForm>) -> Response {
    let callback_url = sanitize_callback(form.callback_url.as_deref());
    let Some(provider) = session.state().providers().get(CREDENTIALS_PROVIDER_ID) else {
        error!("Credentials provider is not registered");
        return session.redirect(&error_redirect("Configuration"));
    };

    let assertion = Assertion::Credentials(Credentials::new(form.email, form.password));
    let outcome = provider
        .authenticate(&assertion)
        .await
        .and_then(|signed_in| session.establish(&signed_in).map_err(ExchangeError::from));
    match outcome {
        Ok(()) => session.redirect(&callback_url),
        Err(err) => {
            let status = match err {
                ExchangeError::InvalidCredentials | ExchangeError::IdentityUnavailable => {
                    debug!("Sign-in denied: {err}");
                    StatusCode::UNAUTHORIZED
                }
                _ => {
                    error!("Sign-in failed: {err}");
                    StatusCode::BAD_GATEWAY
                }
            };
            let email = match &assertion {
                Assertion::Credentials(credentials) => credentials.email.as_str(),
                Assertion::AuthorizationCode { .. } => "",
            };
            let providers = session.state().providers().oauth_ids();
            session.finish((
                status,
                pages::sign_in(&pages::SignInView {
                    callback_url: &callback_url,
                    email,
                    error: Some(err.user_message()),
                    providers: &providers,
                }),
            ))
        }
    }
}

pub async fn register_page(session: RequestSession) -> Response {
    session.finish(pages::register(&pages::RegisterView {
        name: "",
        email: "",
        error: None,
        field_errors: &FieldErrors::new(),
    }))
}

pub async fn register(session: RequestSession, Form(form): Form<RegistrationForm>) -> Response {
    let render = |status: StatusCode, error: Option<&str>, field_errors: &FieldErrors| {
        (
            status,
            pages::register(&pages::RegisterView {
                name: &form.name,
                email: &form.email,
                error,
                field_errors,
            }),
        )
    };

    let request = match validate_registration(&form) {
        Ok(request) => request,
        Err(field_errors) => {
            return session.finish(render(
                StatusCode::UNPROCESSABLE_ENTITY,
                None,
                &field_errors,
            ));
        }
    };

    match session.state().exchange().register_and_sign_in(&request).await {
        Ok(signed_in) => match session.establish(&signed_in) {
            Ok(()) => session.redirect(DEFAULT_CALLBACK_PATH),
            Err(err) => {
                error!("Account created but the session was not stored: {err}");
                let err = RegisterError::SignIn(err.into());
                session.finish(render(
                    StatusCode::BAD_GATEWAY,
                    Some(&err.user_message()),
                    &FieldErrors::new(),
                ))
            }
        },
        Err(RegisterError::SignIn(err)) => {
            warn!("Account created but sign-in failed: {err}");
            session.redirect(&sign_in_redirect(DEFAULT_CALLBACK_PATH))
        }
        Err(err) => {
            let status = match &err {
                RegisterError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                RegisterError::Conflict => StatusCode::CONFLICT,
                RegisterError::Transport(_) => StatusCode::BAD_GATEWAY,
                RegisterError::Rejected(_) | RegisterError::SignIn(_) => StatusCode::BAD_REQUEST,
            };
            let empty = FieldErrors::new();
            let field_errors = err.field_errors().unwrap_or(&empty);
            session.finish(render(status, Some(&err.user_message()), field_errors))
        }
    }
}

pub async fn sign_out_page(session: RequestSession) -> Response {
    session.finish(pages::sign_out())
}

pub async fn sign_out(session: RequestSession) -> Response {
    session.sign_out();
    info!("Signed out");
    session.redirect("/")
}

pub async fn error_page(Query(query): Query<ErrorQuery>) -> impl IntoResponse {
    pages::auth_error(query.error.as_deref(), query.error_description.as_deref())
}

fn oauth_state_cookie(value: &str, max_age: u64, secure: bool) -> Option<HeaderValue> {
    let mut cookie = format!(
        "{OAUTH_STATE_COOKIE}={value}; Path=/auth/oauth; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

/// Splits the state cookie into the state token and the callback path.
fn parse_oauth_state(cookie: &str) -> (String, String) {
    match cookie.split_once(':') {
        Some((state, callback)) => {
            let callback: String = form_urlencoded::parse(format!("c={callback}").as_bytes())
                .find_map(|(key, value)| (key == "c").then(|| value.into_owned()))
                .unwrap_or_default();
            (state.to_string(), sanitize_callback(Some(&callback)))
        }
        None => (cookie.to_string(), DEFAULT_CALLBACK_PATH.to_string()),
    }
}

pub async fn oauth_start(
    session: RequestSession,
    Path(provider_id): Path<String>,
    Query(query): Query<OAuthStartQuery>,
) -> Response {
    let state = session.state();
    let redirect_uri = state.web().oauth_redirect_uri(&provider_id);
    let csrf = Ulid::new().to_string();
    let Some(url) = state
        .providers()
        .get(&provider_id)
        .and_then(|provider| provider.authorization_url(&csrf, &redirect_uri))
    else {
        warn!(provider = %provider_id, "Unknown OAuth provider");
        return session.redirect(&error_redirect("OAuthSignin"));
    };

    let callback = sanitize_callback(query.callback_url.as_deref());
    let encoded: String = form_urlencoded::byte_serialize(callback.as_bytes()).collect();
    let mut response = session.redirect(&url);
    if let Some(cookie) = oauth_state_cookie(
        &format!("{csrf}:{encoded}"),
        OAUTH_STATE_TTL_SECONDS,
        state.web().session_cookie_secure(),
    ) {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

pub async fn oauth_callback(
    session: RequestSession,
    headers: HeaderMap,
    Path(provider_id): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    let secure = session.state().web().session_cookie_secure();
    let with_cleared_state = |mut response: Response| {
        if let Some(cookie) = oauth_state_cookie("", 0, secure) {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        response
    };

    if let Some(error) = query.error.as_deref() {
        debug!(provider = %provider_id, "Provider returned {error}");
        return with_cleared_state(session.redirect(&error_redirect("AccessDenied")));
    }

    let (expected_state, callback_url) = cookie_value(&headers, OAUTH_STATE_COOKIE)
        .map(|cookie| parse_oauth_state(&cookie))
        .unwrap_or_default();
    let (Some(code), Some(state)) = (query.code, query.state) else {
        return with_cleared_state(session.redirect(&error_redirect("OAuthCallback")));
    };
    if expected_state.is_empty() || state != expected_state {
        warn!(provider = %provider_id, "OAuth state mismatch");
        return with_cleared_state(session.redirect(&error_redirect("OAuthCallback")));
    }

    let Some(provider) = session.state().providers().get(&provider_id) else {
        return with_cleared_state(session.redirect(&error_redirect("OAuthSignin")));
    };
    let assertion = Assertion::AuthorizationCode {
        code,
        redirect_uri: session.state().web().oauth_redirect_uri(&provider_id),
    };

    let outcome = provider
        .authenticate(&assertion)
        .await
        .and_then(|signed_in| session.establish(&signed_in).map_err(ExchangeError::from));
    match outcome {
        Ok(()) => with_cleared_state(session.redirect(&callback_url)),
        Err(err) => {
            warn!(provider = %provider_id, "OAuth sign-in failed: {err}");
            with_cleared_state(session.redirect(&error_redirect(err.error_code())))
        }
    }
}

/// Plain redirect used for the bare `/auth` path.
pub async fn auth_index() -> Redirect {
    Redirect::to("/auth/signin")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_redirect_encodes_code() {
        assert_eq!(error_redirect("OAuthCallback"), "/auth/error?error=OAuthCallback");
    }

    #[test]
    fn oauth_state_round_trips_callback() {
        let encoded: String = form_urlencoded::byte_serialize(b"/tests?skip=10").collect();
        let (state, callback) = parse_oauth_state(&format!("01ABC:{encoded}"));
        assert_eq!(state, "01ABC");
        assert_eq!(callback, "/tests?skip=10");
    }

    #[test]
    fn oauth_state_rejects_foreign_callbacks() {
        let encoded: String = form_urlencoded::byte_serialize(b"https://evil.example").collect();
        let (_, callback) = parse_oauth_state(&format!("01ABC:{encoded}"));
        assert_eq!(callback, DEFAULT_CALLBACK_PATH);

        let (state, callback) = parse_oauth_state("01ABC");
        assert_eq!(state, "01ABC");
        assert_eq!(callback, DEFAULT_CALLBACK_PATH);
    }
}

//! Server-rendered markup. Deliberately plain: styling and layout belong to
//! the design system, these pages only need to carry the forms and data.

use crate::{
    client::FieldErrors,
    features::{
        auth::types::Session,
        tests::types::{Page, Test},
    },
};
use axum::response::Html;
use std::fmt::Write as _;

/// Escapes text for HTML bodies and attribute values.
#[must_use]
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html lang=\"en\"><head><meta charset=\"utf-8\"><title>{} | Quizdesk</title></head>\n<body><main>\n<h1>{}</h1>\n{body}\n</main></body></html>\n",
        escape(title),
        escape(title),
    ))
}

fn banner(message: Option<&str>) -> String {
    message.map_or_else(String::new, |message| {
        format!("<p class=\"banner\" role=\"alert\">{}</p>", escape(message))
    })
}

fn field_error(errors: &FieldErrors, field: &str) -> String {
    errors.get(field).map_or_else(String::new, |message| {
        format!(
            "<span class=\"field-error\" id=\"{field}-error\">{}</span>",
            escape(message)
        )
    })
}

#[must_use]
pub fn home() -> Html<String> {
    layout(
        "Quizdesk",
        "<p>Practice tests for everyone.</p>\n<nav><a href=\"/auth/signin\">Sign in</a> | <a href=\"/auth/register\">Create an account</a> | <a href=\"/dashboard/guest\">Continue as guest</a></nav>",
    )
}

pub struct SignInView<'a> {
    pub callback_url: &'a str,
    pub email: &'a str,
    pub error: Option<&'a str>,
    pub providers: &'a [String],
}

#[must_use]
pub fn sign_in(view: &SignInView<'_>) -> Html<String> {
    let mut body = banner(view.error);
    let _ = write!(
        body,
        "<form method=\"post\" action=\"/auth/signin\">\n<input type=\"hidden\" name=\"callbackUrl\" value=\"{}\">\n<label>Email <input type=\"email\" name=\"email\" value=\"{}\" required></label>\n<label>Password <input type=\"password\" name=\"password\" required></label>\n<button type=\"submit\">Sign in</button>\n</form>",
        escape(view.callback_url),
        escape(view.email),
    );
    for provider in view.providers {
        let _ = write!(
            body,
            "\n<p><a href=\"/auth/oauth/{id}?callbackUrl={callback}\">Continue with {id}</a></p>",
            id = escape(provider),
            callback = escape(&url::form_urlencoded::byte_serialize(view.callback_url.as_bytes()).collect::<String>()),
        );
    }
    body.push_str("\n<p>No account yet? <a href=\"/auth/register\">Register</a></p>");
    layout("Sign in", &body)
}

pub struct RegisterView<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub error: Option<&'a str>,
    pub field_errors: &'a FieldErrors,
}

#[must_use]
pub fn register(view: &RegisterView<'_>) -> Html<String> {
    let mut body = banner(view.error);
    let _ = write!(
        body,
        "<form method=\"post\" action=\"/auth/register\">\n<label>Name <input name=\"name\" value=\"{}\" required></label>{}\n<label>Email <input type=\"email\" name=\"email\" value=\"{}\" required></label>{}\n<label>Password <input type=\"password\" name=\"password\" required></label>{}\n<label>Confirm password <input type=\"password\" name=\"confirm_password\" required></label>{}\n<button type=\"submit\">Create account</button>\n</form>\n<p>Already registered? <a href=\"/auth/signin\">Sign in</a></p>",
        escape(view.name),
        field_error(view.field_errors, "name"),
        escape(view.email),
        field_error(view.field_errors, "email"),
        field_error(view.field_errors, "password"),
        field_error(view.field_errors, "confirm_password"),
    );
    layout("Create an account", &body)
}

#[must_use]
pub fn sign_out() -> Html<String> {
    layout(
        "Sign out",
        "<p>Are you sure you want to sign out?</p>\n<form method=\"post\" action=\"/auth/signout\"><button type=\"submit\">Sign out</button></form>\n<p><a href=\"/dashboard\">Cancel</a></p>",
    )
}

/// Message for an auth error code; unknown codes are shown as-is.
#[must_use]
pub fn auth_error_message(code: Option<&str>) -> String {
    match code {
        Some("CredentialsSignin") => "Invalid credentials.".to_string(),
        Some("SessionRequired") => "Please sign in to access this page.".to_string(),
        Some("AccessDenied") => "Access denied.".to_string(),
        Some("OAuthSignin") => "Could not start signing in with the provider.".to_string(),
        Some("OAuthCallback") => "Could not process the provider's response.".to_string(),
        Some("EmailAlreadyExists") => "A user with this email already exists.".to_string(),
        Some("Configuration") => "There is a problem with the server configuration.".to_string(),
        Some("Default") | None => "An unknown error occurred.".to_string(),
        Some(other) => other.to_string(),
    }
}

#[must_use]
pub fn auth_error(code: Option<&str>, description: Option<&str>) -> Html<String> {
    let mut body = String::from(
        "<p>Something went wrong while signing in. Please try again.</p>\n",
    );
    let _ = write!(
        body,
        "<p class=\"banner\" role=\"alert\"><strong>Error:</strong> {}</p>",
        escape(&auth_error_message(code))
    );
    if let Some(description) = description.filter(|value| !value.trim().is_empty()) {
        let _ = write!(
            body,
            "\n<p><strong>Details:</strong> {}</p>",
            escape(description)
        );
    }
    if let Some(code) = code {
        let _ = write!(body, "\n<p><strong>Code:</strong> {}</p>", escape(code));
    }
    body.push_str("\n<p><a href=\"/auth/signin\">Try again</a> | <a href=\"/\">Home</a></p>");
    layout("Authentication error", &body)
}

#[must_use]
pub fn placeholder() -> Html<String> {
    layout("Loading", "<p>Loading your session...</p>")
}

#[must_use]
pub fn unauthorized() -> Html<String> {
    layout(
        "Access denied",
        "<p>You do not have permission to view this page.</p>\n<p><a href=\"/dashboard\">Back to dashboard</a></p>",
    )
}

fn account_nav(session: &Session) -> String {
    format!(
        "<p>Signed in as {}</p>\n<nav><a href=\"/tests\">Tests</a> | <a href=\"/auth/signout\">Sign out</a></nav>",
        escape(&session.identity.email)
    )
}

#[must_use]
pub fn user_dashboard(session: &Session) -> Html<String> {
    let body = format!(
        "{}\n<p>Pick a test from the catalogue to start practicing.</p>",
        account_nav(session)
    );
    layout("Your dashboard", &body)
}

#[must_use]
pub fn admin_dashboard(session: &Session) -> Html<String> {
    let body = format!(
        "{}\n<p>Manage the test catalogue through <code>/api/tests</code>.</p>",
        account_nav(session)
    );
    layout("Admin panel", &body)
}

#[must_use]
pub fn guest_dashboard() -> Html<String> {
    layout(
        "Guest dashboard",
        "<p>You are browsing as a guest. <a href=\"/auth/register\">Create an account</a> to take tests and keep your results.</p>",
    )
}

#[must_use]
pub fn test_list(session: &Session, tests: &[Test], page: Page) -> Html<String> {
    let mut body = account_nav(session);
    if tests.is_empty() {
        body.push_str("\n<p>No tests available.</p>");
    } else {
        body.push_str("\n<ul>");
        for test in tests {
            let duration = test
                .duration
                .map_or_else(String::new, |minutes| format!(" ({minutes} min)"));
            let _ = write!(
                body,
                "\n<li><a href=\"/tests/{}\">{}</a>{}</li>",
                escape(&test.id),
                escape(&test.title),
                escape(&duration)
            );
        }
        body.push_str("\n</ul>");
    }
    body.push_str("\n<nav>");
    if let Some(previous) = page.previous() {
        let _ = write!(
            body,
            "<a href=\"/tests?skip={}&amp;limit={}\">Previous</a> ",
            previous.skip, previous.limit
        );
    }
    if u32::try_from(tests.len()).is_ok_and(|count| count >= page.limit) {
        let next = page.next();
        let _ = write!(
            body,
            "<a href=\"/tests?skip={}&amp;limit={}\">Next</a>",
            next.skip, next.limit
        );
    }
    body.push_str("</nav>");
    layout("Tests", &body)
}

#[must_use]
pub fn test_detail(session: &Session, test: &Test) -> Html<String> {
    let mut body = account_nav(session);
    if let Some(description) = &test.description {
        let _ = write!(body, "\n<p>{}</p>", escape(description));
    }
    if let Some(minutes) = test.duration {
        let _ = write!(body, "\n<p>Duration: {minutes} minutes</p>");
    }
    let _ = write!(body, "\n<p>{} questions</p>", test.questions.len());
    body.push_str("\n<ol>");
    for question in &test.questions {
        let _ = write!(body, "\n<li>{}<ul>", escape(&question.question_text));
        for option in &question.options {
            let _ = write!(body, "<li>{}</li>", escape(option));
        }
        body.push_str("</ul></li>");
    }
    body.push_str("\n</ol>\n<p><a href=\"/tests\">Back to tests</a></p>");
    layout(&test.title, &body)
}

#[must_use]
pub fn failure(title: &str, message: &str) -> Html<String> {
    layout(title, &banner(Some(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::auth::types::{SessionToken, UserIdentity};

    fn session() -> Session {
        Session::new(
            SessionToken::new("tok"),
            UserIdentity {
                id: "1".to_string(),
                email: "<a@b.com>".to_string(),
                is_admin: false,
            },
        )
    }

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(
            escape("<script>\"x\" & 'y'</script>"),
            "&lt;script&gt;&quot;x&quot; &amp; &#x27;y&#x27;&lt;/script&gt;"
        );
    }

    #[test]
    fn user_supplied_values_are_escaped() {
        let Html(page) = user_dashboard(&session());
        assert!(page.contains("&lt;a@b.com&gt;"));
        assert!(!page.contains("<a@b.com>"));
    }

    #[test]
    fn register_page_shows_field_errors() {
        let mut errors = FieldErrors::new();
        errors.insert("password".to_string(), "Too weak".to_string());
        let Html(page) = register(&RegisterView {
            name: "Ann",
            email: "a@b.com",
            error: None,
            field_errors: &errors,
        });
        assert!(page.contains("password-error"));
        assert!(page.contains("Too weak"));
        assert!(!page.contains("name-error"));
    }

    #[test]
    fn error_page_maps_codes_and_keeps_unknown_ones() {
        assert_eq!(auth_error_message(Some("CredentialsSignin")), "Invalid credentials.");
        assert_eq!(auth_error_message(Some("Custom")), "Custom");
        assert_eq!(auth_error_message(None), "An unknown error occurred.");

        let Html(page) = auth_error(Some("OAuthCallback"), Some("state mismatch"));
        assert!(page.contains("state mismatch"));
        assert!(page.contains("OAuthCallback"));
    }

    #[test]
    fn test_list_paginates() {
        let tests: Vec<Test> = (0..2)
            .map(|index| Test {
                id: index.to_string(),
                title: format!("Test {index}"),
                description: None,
                created_at: None,
                duration: Some(10),
                questions: Vec::new(),
            })
            .collect();
        let Html(page) = test_list(&session(), &tests, Page { skip: 2, limit: 2 });
        assert!(page.contains("skip=0&amp;limit=2"));
        assert!(page.contains("skip=4&amp;limit=2"));
        assert!(page.contains("Test 1"));
    }
}

//! Registration form rules, checked before the backend is called.

use super::types::{RegisterRequest, normalize_email};
use crate::client::FieldErrors;
use regex::Regex;
use serde::Deserialize;

const NAME_MIN_CHARS: usize = 3;
const NAME_MAX_CHARS: usize = 50;
const PASSWORD_MIN_CHARS: usize = 8;
const PASSWORD_SPECIAL_CHARS: &str = "!@#$%^&*";

/// Raw registration form as submitted by the browser.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistrationForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl std::fmt::Debug for RegistrationForm {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RegistrationForm")
            .field("name", &self.name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Messages for every password rule the value breaks.
#[must_use]
pub fn password_problems(password: &str) -> Vec<&'static str> {
    let mut problems = Vec::new();
    if password.chars().count() < PASSWORD_MIN_CHARS {
        problems.push("Password must be at least 8 characters");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        problems.push("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        problems.push("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("Password must contain at least one number");
    }
    if !password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c)) {
        problems.push("Password must contain at least one special character (!@#$%^&*)");
    }
    problems
}

/// Checks the form and builds the backend request.
///
/// # Errors
/// Returns a field to message map with every rule the form breaks.
pub fn validate_registration(form: &RegistrationForm) -> Result<RegisterRequest, FieldErrors> {
    let mut errors = FieldErrors::new();

    let name = form.name.trim();
    let name_len = name.chars().count();
    if name_len < NAME_MIN_CHARS {
        errors.insert(
            "name".to_string(),
            "Name must be at least 3 characters".to_string(),
        );
    } else if name_len > NAME_MAX_CHARS {
        errors.insert(
            "name".to_string(),
            "Name must be less than 50 characters".to_string(),
        );
    }

    let email = normalize_email(&form.email);
    if !valid_email(&email) {
        errors.insert(
            "email".to_string(),
            "Please enter a valid email address".to_string(),
        );
    }

    let problems = password_problems(&form.password);
    if !problems.is_empty() {
        errors.insert("password".to_string(), problems.join("; "));
    }

    if form.password != form.confirm_password {
        errors.insert(
            "confirm_password".to_string(),
            "Passwords don't match".to_string(),
        );
    }

    if errors.is_empty() {
        Ok(RegisterRequest {
            name: name.to_string(),
            email,
            password: form.password.clone(),
        })
    } else {
        Err(errors)
    }
}

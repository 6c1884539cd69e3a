//! Backend endpoint configuration shared by every API call. The same logical
//! backend is reachable under two base URLs: one resolved by this server and
//! one handed to browsers. Configuration values are public; do not store
//! secrets here.

use std::time::Duration;

/// Default backend base URL, including the API prefix.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/v1";
/// Default request timeout applied to every backend call.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Which side of the wire resolves a backend URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Server,
    Browser,
}

/// Backend configuration for the API gateway and the credential exchange.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    api_base_url: String,
    public_api_base_url: Option<String>,
    timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL.to_string())
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(api_base_url: String) -> Self {
        Self {
            api_base_url,
            public_api_base_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }

    /// Sets the browser-facing base URL. Blank values keep the server URL.
    #[must_use]
    pub fn with_public_api_base_url(mut self, url: Option<String>) -> Self {
        self.public_api_base_url = url.as_deref().and_then(normalize_value);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Base URL for the given resolution context.
    #[must_use]
    pub fn base_url(&self, resolution: Resolution) -> &str {
        match resolution {
            Resolution::Server => &self.api_base_url,
            Resolution::Browser => self
                .public_api_base_url
                .as_deref()
                .unwrap_or(&self.api_base_url),
        }
    }

    /// Full URL for a backend path, resolved server side.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        build_url_with_base(self.base_url(Resolution::Server), path)
    }
}

/// Builds a URL from an explicit base URL and the provided path.
#[must_use]
pub fn build_url_with_base(base_url: &str, path: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let path = path.trim();

    if base.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}

fn normalize_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientConfig, Resolution, build_url_with_base};
    use std::time::Duration;

    #[test]
    fn build_url_joins_without_duplicate_slashes() {
        assert_eq!(
            build_url_with_base("http://api.local/api/v1/", "/auth/me"),
            "http://api.local/api/v1/auth/me"
        );
        assert_eq!(
            build_url_with_base("http://api.local", "tests"),
            "http://api.local/tests"
        );
    }

    #[test]
    fn build_url_with_empty_base_returns_path() {
        assert_eq!(build_url_with_base("  ", "/tests"), "/tests");
    }

    #[test]
    fn browser_resolution_falls_back_to_server_url() {
        let config = ClientConfig::new("http://backend:8000/api/v1".to_string())
            .with_public_api_base_url(Some("   ".to_string()));
        assert_eq!(
            config.base_url(Resolution::Browser),
            "http://backend:8000/api/v1"
        );
    }

    #[test]
    fn browser_resolution_uses_public_url_when_present() {
        let config = ClientConfig::new("http://backend:8000/api/v1".to_string())
            .with_public_api_base_url(Some(" https://quiz.example/api/v1 ".to_string()))
            .with_timeout(Duration::from_secs(3));
        assert_eq!(
            config.base_url(Resolution::Browser),
            "https://quiz.example/api/v1"
        );
        assert_eq!(
            config.base_url(Resolution::Server),
            "http://backend:8000/api/v1"
        );
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(config.url("/tests"), "http://backend:8000/api/v1/tests");
    }
}

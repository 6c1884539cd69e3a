use crate::{
    client::ClientConfig,
    features::auth::{SessionProvider, providers::OAuthConfig},
    web::{self, AppState, WebConfig},
};
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub api_base_url: String,
    pub public_api_base_url: Option<String>,
    pub request_timeout_seconds: u64,
    pub public_url: String,
    pub session_ttl_days: u32,
    pub session_cookie_secure: bool,
    pub identity_cache_seconds: u64,
    pub oauth: Vec<OAuthConfig>,
}

impl Args {
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.api_base_url.clone())
            .with_public_api_base_url(self.public_api_base_url.clone())
            .with_timeout(Duration::from_secs(self.request_timeout_seconds))
    }

    #[must_use]
    pub fn web_config(&self) -> WebConfig {
        WebConfig::default()
            .with_public_url(self.public_url.clone())
            .with_session_ttl_days(self.session_ttl_days)
            .with_session_cookie_secure(self.session_cookie_secure)
    }

    /// Builds the shared server state from the parsed arguments.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn app_state(&self) -> Result<AppState> {
        let sessions = SessionProvider::new(self.session_ttl_days)
            .with_cache_ttl(Duration::from_secs(self.identity_cache_seconds));
        let state = AppState::new(self.client_config(), self.web_config())
            .context("Failed to build the backend HTTP client")?
            .with_session_provider(sessions);

        Ok(self
            .oauth
            .iter()
            .cloned()
            .fold(state, AppState::with_oauth))
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the state cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let state = args.app_state()?;

    web::serve(args.port, state).await
}

fn log_startup_args(args: &Args) {
    let oauth = if args.oauth.is_empty() {
        "none".to_string()
    } else {
        args.oauth
            .iter()
            .map(|provider| provider.id.as_str())
            .collect::<Vec<_>>()
            .join(",")
    };
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("api_base_url", args.api_base_url.clone()),
        (
            "public_api_base_url",
            args.public_api_base_url
                .clone()
                .unwrap_or_else(|| "same as api_base_url".to_string()),
        ),
        ("request_timeout", format!("{}s", args.request_timeout_seconds)),
        ("public_url", args.public_url.clone()),
        ("session_ttl", format!("{}d", args.session_ttl_days)),
        ("session_cookie_secure", args.session_cookie_secure.to_string()),
        ("identity_cache", format!("{}s", args.identity_cache_seconds)),
        ("oauth_providers", oauth),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "quizdesk {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

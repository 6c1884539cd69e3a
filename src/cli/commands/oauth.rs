use crate::features::auth::providers::OAuthConfig;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_OAUTH_GOOGLE_CLIENT_ID: &str = "oauth-google-client-id";
pub const ARG_OAUTH_GOOGLE_CLIENT_SECRET: &str = "oauth-google-client-secret";

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub providers: Vec<OAuthConfig>,
}

impl Options {
    /// Providers are enabled only when both the client id and secret are set.
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let mut providers = Vec::new();
        if let (Some(client_id), Some(client_secret)) = (
            get_non_empty(ARG_OAUTH_GOOGLE_CLIENT_ID),
            get_non_empty(ARG_OAUTH_GOOGLE_CLIENT_SECRET),
        ) {
            providers.push(OAuthConfig::google(
                client_id,
                SecretString::from(client_secret),
            ));
        }

        Self { providers }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OAUTH_GOOGLE_CLIENT_ID)
                .long(ARG_OAUTH_GOOGLE_CLIENT_ID)
                .help("Google OAuth client id")
                .env("QUIZDESK_OAUTH_GOOGLE_CLIENT_ID")
                .requires(ARG_OAUTH_GOOGLE_CLIENT_SECRET),
        )
        .arg(
            Arg::new(ARG_OAUTH_GOOGLE_CLIENT_SECRET)
                .long(ARG_OAUTH_GOOGLE_CLIENT_SECRET)
                .help("Google OAuth client secret")
                .env("QUIZDESK_OAUTH_GOOGLE_CLIENT_SECRET")
                .hide_env_values(true)
                .requires(ARG_OAUTH_GOOGLE_CLIENT_ID),
        )
}

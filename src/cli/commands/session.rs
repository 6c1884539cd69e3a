use crate::{
    features::auth::{state::DEFAULT_IDENTITY_CACHE_SECONDS, store::DEFAULT_SESSION_TTL_DAYS},
    web::state::DEFAULT_PUBLIC_URL,
};
use anyhow::bail;
use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_PUBLIC_URL: &str = "public-url";
pub const ARG_SESSION_TTL_DAYS: &str = "session-ttl-days";
pub const ARG_SESSION_COOKIE_SECURE: &str = "session-cookie-secure";
pub const ARG_IDENTITY_CACHE_SECONDS: &str = "identity-cache-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub public_url: String,
    pub ttl_days: u32,
    pub cookie_secure: bool,
    pub identity_cache_seconds: u64,
}

impl Options {
    /// Parse session arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the public URL is invalid or the TTL is zero.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let public_url = matches
            .get_one::<String>(ARG_PUBLIC_URL)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string());
        super::backend::validate_base_url(ARG_PUBLIC_URL, &public_url)?;

        let ttl_days = matches
            .get_one::<u32>(ARG_SESSION_TTL_DAYS)
            .copied()
            .unwrap_or(DEFAULT_SESSION_TTL_DAYS);
        if ttl_days == 0 {
            bail!("--{ARG_SESSION_TTL_DAYS} must be greater than zero");
        }

        Ok(Self {
            public_url,
            ttl_days,
            cookie_secure: matches.get_flag(ARG_SESSION_COOKIE_SECURE),
            identity_cache_seconds: matches
                .get_one::<u64>(ARG_IDENTITY_CACHE_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_IDENTITY_CACHE_SECONDS),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PUBLIC_URL)
                .long(ARG_PUBLIC_URL)
                .help("Public URL of this server, used for OAuth redirect URIs")
                .env("QUIZDESK_PUBLIC_URL")
                .default_value(DEFAULT_PUBLIC_URL),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_DAYS)
                .long(ARG_SESSION_TTL_DAYS)
                .help("Session cookie lifetime in days")
                .env("QUIZDESK_SESSION_TTL_DAYS")
                .default_value("7")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE_SECURE)
                .long(ARG_SESSION_COOKIE_SECURE)
                .help("Mark session cookies Secure (serve over HTTPS)")
                .env("QUIZDESK_SESSION_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_IDENTITY_CACHE_SECONDS)
                .long(ARG_IDENTITY_CACHE_SECONDS)
                .help("How long a resolved identity is reused before asking the backend again")
                .long_help(
                    "How long a resolved identity is reused before asking the backend again. 0 disables the cache; every protected page then calls GET /auth/me.",
                )
                .env("QUIZDESK_IDENTITY_CACHE_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
}

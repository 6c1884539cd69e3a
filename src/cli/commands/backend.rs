use crate::client::config::{DEFAULT_API_BASE_URL, DEFAULT_TIMEOUT_SECONDS};
use anyhow::{Context, bail};
use clap::{Arg, ArgMatches, Command};
use url::Url;

pub const ARG_API_BASE_URL: &str = "api-base-url";
pub const ARG_PUBLIC_API_BASE_URL: &str = "public-api-base-url";
pub const ARG_REQUEST_TIMEOUT_SECONDS: &str = "request-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub api_base_url: String,
    pub public_api_base_url: Option<String>,
    pub request_timeout_seconds: u64,
}

impl Options {
    /// Parse backend arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a base URL is not an absolute http(s) URL or the
    /// timeout is zero.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let api_base_url = matches
            .get_one::<String>(ARG_API_BASE_URL)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        validate_base_url(ARG_API_BASE_URL, &api_base_url)?;

        let public_api_base_url = matches
            .get_one::<String>(ARG_PUBLIC_API_BASE_URL)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        if let Some(url) = &public_api_base_url {
            validate_base_url(ARG_PUBLIC_API_BASE_URL, url)?;
        }

        let request_timeout_seconds = matches
            .get_one::<u64>(ARG_REQUEST_TIMEOUT_SECONDS)
            .copied()
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        if request_timeout_seconds == 0 {
            bail!("--{ARG_REQUEST_TIMEOUT_SECONDS} must be greater than zero");
        }

        Ok(Self {
            api_base_url,
            public_api_base_url,
            request_timeout_seconds,
        })
    }
}

/// Base URLs must be absolute http(s) URLs; the path prefix is kept as is.
///
/// # Errors
/// Returns an error naming the argument when the value is not usable.
pub fn validate_base_url(arg: &str, value: &str) -> anyhow::Result<()> {
    let url = Url::parse(value).with_context(|| format!("invalid --{arg}: {value}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("invalid --{arg}: scheme must be http or https");
    }
    if url.host_str().is_none() {
        bail!("invalid --{arg}: missing host");
    }
    Ok(())
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_API_BASE_URL)
                .long(ARG_API_BASE_URL)
                .help("Backend base URL used by this server, including the API prefix")
                .env("QUIZDESK_API_BASE_URL")
                .default_value(DEFAULT_API_BASE_URL),
        )
        .arg(
            Arg::new(ARG_PUBLIC_API_BASE_URL)
                .long(ARG_PUBLIC_API_BASE_URL)
                .help("Backend base URL handed to browsers")
                .long_help(
                    "Backend base URL handed to browsers. Falls back to --api-base-url when unset or blank.",
                )
                .env("QUIZDESK_PUBLIC_API_BASE_URL"),
        )
        .arg(
            Arg::new(ARG_REQUEST_TIMEOUT_SECONDS)
                .long(ARG_REQUEST_TIMEOUT_SECONDS)
                .help("Timeout for every backend request in seconds")
                .env("QUIZDESK_REQUEST_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
}

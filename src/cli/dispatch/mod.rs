//! Maps validated CLI matches to the action the binary runs.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_PORT, backend, oauth, session};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if an argument value is invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(3000);

    let backend_opts = backend::Options::parse(matches)?;
    let session_opts = session::Options::parse(matches)?;
    let oauth_opts = oauth::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        api_base_url: backend_opts.api_base_url,
        public_api_base_url: backend_opts.public_api_base_url,
        request_timeout_seconds: backend_opts.request_timeout_seconds,
        public_url: session_opts.public_url,
        session_ttl_days: session_opts.ttl_days,
        session_cookie_secure: session_opts.cookie_secure,
        identity_cache_seconds: session_opts.identity_cache_seconds,
        oauth: oauth_opts.providers,
    }))
}

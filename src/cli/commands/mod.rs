pub mod backend;
pub mod logging;
pub mod oauth;
pub mod session;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_PORT: &str = "port";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("quizdesk")
        .about("Web front and session bridge for the quiz platform")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("3000")
                .env("QUIZDESK_PORT")
                .value_parser(clap::value_parser!(u16)),
        );

    let command = backend::with_args(command);
    let command = session::with_args(command);
    let command = oauth::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIZDESK_VARS: [&str; 10] = [
        "QUIZDESK_PORT",
        "QUIZDESK_API_BASE_URL",
        "QUIZDESK_PUBLIC_API_BASE_URL",
        "QUIZDESK_REQUEST_TIMEOUT_SECONDS",
        "QUIZDESK_PUBLIC_URL",
        "QUIZDESK_SESSION_TTL_DAYS",
        "QUIZDESK_SESSION_COOKIE_SECURE",
        "QUIZDESK_IDENTITY_CACHE_SECONDS",
        "QUIZDESK_OAUTH_GOOGLE_CLIENT_ID",
        "QUIZDESK_OAUTH_GOOGLE_CLIENT_SECRET",
    ];

    // Runs `f` with every QUIZDESK_* variable unset, plus the given overrides.
    fn with_env<F, R>(overrides: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let mut vars: Vec<(&str, Option<&str>)> = QUIZDESK_VARS
            .iter()
            .chain(["QUIZDESK_LOG_LEVEL"].iter())
            .map(|name| (*name, None))
            .collect();
        for (name, value) in overrides {
            vars.retain(|(existing, _)| existing != name);
            vars.push((*name, Some(*value)));
        }
        temp_env::with_vars(vars, f)
    }

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "quizdesk");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Web front and session bridge for the quiz platform".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults() {
        with_env(&[], || {
            let matches = new().get_matches_from(vec!["quizdesk"]);
            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(3000));
            assert_eq!(
                matches.get_one::<String>(backend::ARG_API_BASE_URL).cloned(),
                Some("http://localhost:8000/api/v1".to_string())
            );
            assert_eq!(
                matches
                    .get_one::<String>(backend::ARG_PUBLIC_API_BASE_URL)
                    .cloned(),
                None
            );
            assert_eq!(
                matches.get_one::<u32>(session::ARG_SESSION_TTL_DAYS).copied(),
                Some(7)
            );
            assert!(!matches.get_flag(session::ARG_SESSION_COOKIE_SECURE));
        });
    }

    #[test]
    fn test_check_args() {
        with_env(&[], || {
            let matches = new().get_matches_from(vec![
                "quizdesk",
                "--port",
                "8080",
                "--api-base-url",
                "http://backend:8000/api/v1",
                "--public-api-base-url",
                "https://api.quizdesk.dev/api/v1",
                "--session-ttl-days",
                "1",
                "--session-cookie-secure",
            ]);
            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(8080));
            assert_eq!(
                matches.get_one::<String>(backend::ARG_API_BASE_URL).cloned(),
                Some("http://backend:8000/api/v1".to_string())
            );
            assert_eq!(
                matches
                    .get_one::<String>(backend::ARG_PUBLIC_API_BASE_URL)
                    .cloned(),
                Some("https://api.quizdesk.dev/api/v1".to_string())
            );
            assert_eq!(
                matches.get_one::<u32>(session::ARG_SESSION_TTL_DAYS).copied(),
                Some(1)
            );
            assert!(matches.get_flag(session::ARG_SESSION_COOKIE_SECURE));
        });
    }

    #[test]
    fn test_check_env() {
        with_env(
            &[
                ("QUIZDESK_PORT", "443"),
                ("QUIZDESK_API_BASE_URL", "http://backend:8000/api/v1"),
                ("QUIZDESK_REQUEST_TIMEOUT_SECONDS", "3"),
                ("QUIZDESK_SESSION_COOKIE_SECURE", "true"),
                ("QUIZDESK_LOG_LEVEL", "info"),
            ],
            || {
                let matches = new().get_matches_from(vec!["quizdesk"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>(backend::ARG_API_BASE_URL).cloned(),
                    Some("http://backend:8000/api/v1".to_string())
                );
                assert_eq!(
                    matches
                        .get_one::<u64>(backend::ARG_REQUEST_TIMEOUT_SECONDS)
                        .copied(),
                    Some(3)
                );
                assert!(matches.get_flag(session::ARG_SESSION_COOKIE_SECURE));
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            with_env(&[("QUIZDESK_LOG_LEVEL", level)], || {
                let matches = new().get_matches_from(vec!["quizdesk"]);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        for index in 0..5 {
            with_env(&[], || {
                let mut args = vec!["quizdesk".to_string()];
                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }

                let matches = new().get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_oauth_args_require_each_other() {
        with_env(&[], || {
            let result = new().try_get_matches_from(vec![
                "quizdesk",
                "--oauth-google-client-id",
                "client-id",
            ]);
            assert_eq!(
                result.map_err(|e| e.kind()).err(),
                Some(clap::error::ErrorKind::MissingRequiredArgument)
            );
        });
    }

    #[test]
    fn test_unknown_args_fail() {
        let result = new().try_get_matches_from(vec!["quizdesk", "--dsn", "postgres://localhost"]);
        assert_eq!(
            result.map_err(|e| e.kind()).err(),
            Some(clap::error::ErrorKind::UnknownArgument)
        );
    }
}

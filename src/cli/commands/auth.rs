use anyhow::{Context, Result};
use clap::{Arg, Command};
use secrecy::SecretString;

use crate::{api::Environment, oauth::AuthenticationMode};

pub const ARG_ISSUER_URL: &str = "issuer-url";
pub const ARG_CLIENT_ID: &str = "client-id";
pub const ARG_SESSION_SECRET: &str = "session-secret";
pub const ARG_COOKIE_NAME: &str = "session-cookie-name";
pub const ARG_SESSION_TTL: &str = "session-ttl-seconds";
pub const ARG_CODE_TTL: &str = "code-ttl-seconds";
pub const ARG_ACCESS_TOKEN_TTL: &str = "access-token-ttl-seconds";
pub const ARG_DEVICE_SESSION_TTL: &str = "device-session-ttl-days";
pub const ARG_SWEEP_INTERVAL: &str = "sweep-interval-seconds";
pub const ARG_ENVIRONMENT: &str = "environment";
pub const ARG_AUTH_MODE: &str = "auth-mode";

/// Session signing secrets below this length are refused at startup.
const MIN_SESSION_SECRET_BYTES: usize = 32;

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ISSUER_URL)
                .long(ARG_ISSUER_URL)
                .help("Public base URL of the provider; also the signed-token issuer")
                .env("WUKONG_IDP_ISSUER_URL")
                .default_value("https://console.wukong.dev"),
        )
        .arg(
            Arg::new(ARG_CLIENT_ID)
                .long(ARG_CLIENT_ID)
                .help("Client id of the first-party console application")
                .env("WUKONG_IDP_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_SESSION_SECRET)
                .long(ARG_SESSION_SECRET)
                .help("HS256 signing secret for session credentials and ID assertions")
                .long_help(
                    "HS256 signing secret for session credentials and ID assertions. \
                     Must be at least 32 bytes; prefer setting it via the environment.",
                )
                .env("WUKONG_IDP_SESSION_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_COOKIE_NAME)
                .long(ARG_COOKIE_NAME)
                .help("Name of the session cookie")
                .env("WUKONG_IDP_SESSION_COOKIE_NAME")
                .default_value("wukong_session"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL)
                .long(ARG_SESSION_TTL)
                .help("Session credential TTL in seconds")
                .env("WUKONG_IDP_SESSION_TTL_SECONDS")
                .default_value("31536000")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_CODE_TTL)
                .long(ARG_CODE_TTL)
                .help("Authorization code TTL in seconds")
                .env("WUKONG_IDP_CODE_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL)
                .long(ARG_ACCESS_TOKEN_TTL)
                .help("Access token TTL in seconds")
                .env("WUKONG_IDP_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_DEVICE_SESSION_TTL)
                .long(ARG_DEVICE_SESSION_TTL)
                .help("Device session TTL in days")
                .env("WUKONG_IDP_DEVICE_SESSION_TTL_DAYS")
                .default_value("30")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL)
                .long(ARG_SWEEP_INTERVAL)
                .help("Interval between expired code/token sweeps in seconds")
                .env("WUKONG_IDP_SWEEP_INTERVAL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_ENVIRONMENT)
                .long(ARG_ENVIRONMENT)
                .help("Deployment environment: production or development")
                .env("WUKONG_IDP_ENVIRONMENT")
                .default_value("production"),
        )
        .arg(
            Arg::new(ARG_AUTH_MODE)
                .long(ARG_AUTH_MODE)
                .help("Unknown-code handling: strict or development-fallback")
                .long_help(
                    "Unknown-code handling. 'development-fallback' binds unknown \
                     authorization codes to a local development identity and is \
                     refused when --environment is production.",
                )
                .env("WUKONG_IDP_AUTH_MODE")
                .default_value("strict"),
        )
}

#[derive(Debug)]
pub struct Options {
    pub issuer_url: String,
    pub client_id: String,
    pub session_secret: SecretString,
    pub cookie_name: String,
    pub session_ttl_seconds: i64,
    pub code_ttl_seconds: i64,
    pub access_token_ttl_seconds: i64,
    pub device_session_ttl_days: i64,
    pub sweep_interval_seconds: u64,
    pub environment: Environment,
    pub auth_mode: AuthenticationMode,
}

impl Options {
    /// Extract and validate auth options from parsed matches.
    ///
    /// # Errors
    /// Returns an error for missing required values, a short signing secret,
    /// an unknown environment/mode, or the development fallback combined
    /// with a production environment.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let issuer_url = matches
            .get_one::<String>(ARG_ISSUER_URL)
            .cloned()
            .context("missing required argument: --issuer-url")?;
        let client_id = matches
            .get_one::<String>(ARG_CLIENT_ID)
            .cloned()
            .context("missing required argument: --client-id")?;
        let secret = matches
            .get_one::<String>(ARG_SESSION_SECRET)
            .cloned()
            .context("missing required argument: --session-secret")?;
        if secret.len() < MIN_SESSION_SECRET_BYTES {
            anyhow::bail!(
                "--session-secret must be at least {MIN_SESSION_SECRET_BYTES} bytes long"
            );
        }

        let environment = matches
            .get_one::<String>(ARG_ENVIRONMENT)
            .and_then(|value| Environment::from_str(value))
            .context("invalid --environment: expected 'production' or 'development'")?;
        let auth_mode = matches
            .get_one::<String>(ARG_AUTH_MODE)
            .and_then(|value| AuthenticationMode::from_str(value))
            .context("invalid --auth-mode: expected 'strict' or 'development-fallback'")?;

        // The fallback must be an explicit, non-production choice; startup
        // fails rather than silently downgrading.
        if environment == Environment::Production
            && auth_mode == AuthenticationMode::DevelopmentFallback
        {
            anyhow::bail!(
                "--auth-mode development-fallback cannot be combined with --environment production"
            );
        }

        Ok(Self {
            issuer_url,
            client_id,
            session_secret: SecretString::from(secret),
            cookie_name: matches
                .get_one::<String>(ARG_COOKIE_NAME)
                .cloned()
                .unwrap_or_else(|| "wukong_session".to_string()),
            session_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL)
                .copied()
                .unwrap_or(31_536_000),
            code_ttl_seconds: matches.get_one::<i64>(ARG_CODE_TTL).copied().unwrap_or(600),
            access_token_ttl_seconds: matches
                .get_one::<i64>(ARG_ACCESS_TOKEN_TTL)
                .copied()
                .unwrap_or(3600),
            device_session_ttl_days: matches
                .get_one::<i64>(ARG_DEVICE_SESSION_TTL)
                .copied()
                .unwrap_or(30),
            sweep_interval_seconds: matches
                .get_one::<u64>(ARG_SWEEP_INTERVAL)
                .copied()
                .unwrap_or(300),
            environment,
            auth_mode,
        })
    }
}

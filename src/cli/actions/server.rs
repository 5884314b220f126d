use crate::api::{self, AuthConfig, Environment};
use crate::oauth::AuthenticationMode;
use anyhow::Result;
use secrecy::SecretString;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
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

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!(
        environment = args.environment.as_str(),
        auth_mode = args.auth_mode.as_str(),
        "starting identity provider"
    );

    let auth_config = AuthConfig::new(args.issuer_url, args.client_id, args.session_secret)
        .with_cookie_name(args.cookie_name)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_code_ttl_seconds(args.code_ttl_seconds)
        .with_access_token_ttl_seconds(args.access_token_ttl_seconds)
        .with_device_session_ttl_days(args.device_session_ttl_days)
        .with_sweep_interval_seconds(args.sweep_interval_seconds)
        .with_environment(args.environment)
        .with_mode(args.auth_mode);

    api::new(args.port, args.dsn, auth_config).await
}

//! Auth configuration and shared request state.

use chrono::Duration;
use secrecy::SecretString;
use std::sync::Arc;

use crate::{
    audit::AuditStore,
    identity::IdentityStore,
    oauth::{AuthenticationMode, CodeStore, OauthService, TokenStore, sweep},
    session::{DeviceSessionStore, SessionManager},
    token::TokenSigner,
    totp::{MfaService, MfaStore},
};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;
const DEFAULT_CODE_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_DEVICE_SESSION_TTL_DAYS: i64 = 30;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 5 * 60;
const DEFAULT_COOKIE_NAME: &str = "wukong_session";
const MFA_ISSUER: &str = "Wukong Console";

/// Deployment environment, used to gate the development fallback.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "production" => Some(Self::Production),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    issuer_url: String,
    client_id: String,
    session_secret: SecretString,
    cookie_name: String,
    session_ttl_seconds: i64,
    code_ttl_seconds: i64,
    access_token_ttl_seconds: i64,
    device_session_ttl_days: i64,
    sweep_interval_seconds: u64,
    environment: Environment,
    mode: AuthenticationMode,
}

impl AuthConfig {
    #[must_use]
    pub fn new(issuer_url: String, client_id: String, session_secret: SecretString) -> Self {
        Self {
            issuer_url,
            client_id,
            session_secret,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            code_ttl_seconds: DEFAULT_CODE_TTL_SECONDS,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            device_session_ttl_days: DEFAULT_DEVICE_SESSION_TTL_DAYS,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
            environment: Environment::Production,
            mode: AuthenticationMode::Strict,
        }
    }

    #[must_use]
    pub fn with_cookie_name(mut self, cookie_name: String) -> Self {
        self.cookie_name = cookie_name;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_device_session_ttl_days(mut self, days: i64) -> Self {
        self.device_session_ttl_days = days;
        self
    }

    #[must_use]
    pub fn with_sweep_interval_seconds(mut self, seconds: u64) -> Self {
        self.sweep_interval_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: AuthenticationMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn sweep_interval_seconds(&self) -> u64 {
        self.sweep_interval_seconds
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub fn mode(&self) -> AuthenticationMode {
        self.mode
    }

    /// Only mark cookies secure when the issuer is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.issuer_url.starts_with("https://")
    }

    pub(crate) fn session_secret(&self) -> &SecretString {
        &self.session_secret
    }
}

/// Everything a request handler needs, wired once at startup.
pub struct AuthState {
    config: AuthConfig,
    oauth: OauthService,
    signer: Arc<TokenSigner>,
    mfa: MfaService,
    sessions: SessionManager,
    identities: Arc<dyn IdentityStore>,
    audit: Arc<dyn AuditStore>,
}

impl AuthState {
    /// Wire the domain services over the given stores.
    #[must_use]
    pub fn new(
        config: AuthConfig,
        identities: Arc<dyn IdentityStore>,
        mfa_store: Arc<dyn MfaStore>,
        session_store: Arc<dyn DeviceSessionStore>,
        audit: Arc<dyn AuditStore>,
    ) -> Self {
        let signer = Arc::new(TokenSigner::new(
            config.session_secret().clone(),
            config.issuer_url.clone(),
        ));
        let codes = Arc::new(CodeStore::new(Duration::seconds(config.code_ttl_seconds)));
        let tokens = Arc::new(TokenStore::new(Duration::seconds(
            config.access_token_ttl_seconds,
        )));
        let oauth = OauthService::new(
            codes,
            tokens,
            Arc::clone(&signer),
            Arc::clone(&identities),
            config.mode,
            Duration::seconds(config.access_token_ttl_seconds),
        );
        let mfa = MfaService::new(mfa_store, Arc::clone(&audit), MFA_ISSUER.to_string());
        let sessions = SessionManager::new(
            session_store,
            Arc::clone(&audit),
            Duration::days(config.device_session_ttl_days),
        );
        Self {
            config,
            oauth,
            signer,
            mfa,
            sessions,
            identities,
            audit,
        }
    }

    /// Start the background expiry sweep for codes and tokens.
    pub fn spawn_sweep(&self) -> tokio::task::JoinHandle<()> {
        sweep::spawn_expiry_sweep(
            Arc::clone(self.oauth.codes()),
            Arc::clone(self.oauth.tokens()),
            std::time::Duration::from_secs(self.config.sweep_interval_seconds),
        )
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn oauth(&self) -> &OauthService {
        &self.oauth
    }

    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    #[must_use]
    pub fn mfa(&self) -> &MfaService {
        &self.mfa
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn identities(&self) -> &Arc<dyn IdentityStore> {
        &self.identities
    }

    #[must_use]
    pub fn audit(&self) -> &Arc<dyn AuditStore> {
        &self.audit
    }
}

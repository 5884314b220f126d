//! Authorization broker and token issuer.
//!
//! The broker mints single-use authorization codes; the issuer exchanges a
//! redeemed code for an opaque access token plus a signed ID assertion, and
//! resolves access tokens back to identity profiles. Codes and tokens live
//! in process-local stores with a periodic expiry sweep; correctness is
//! enforced at redemption/lookup time, never by the sweep.

pub mod codes;
pub mod sweep;
pub mod tokens;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Duration;
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::{
    identity::{Identity, IdentityProfile, IdentityStore},
    token::TokenSigner,
};
pub use codes::{AuthorizationCode, CodeRedeemError, CodeStore};
pub use tokens::{AccessToken, AccessTokenError, TokenStore};

/// The only grant type the token endpoint supports.
pub const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";

/// Scope granted to every exchanged token.
pub const DEFAULT_SCOPE: &str = "openid profile email";

/// External id of the synthetic identity used by the development fallback.
pub const DEV_FALLBACK_EXTERNAL_ID: &str = "dev:local";

/// How the issuer treats unknown authorization codes.
///
/// `DevelopmentFallback` replaces an unknown code with a synthetic one bound
/// to a local development identity, so frontend work does not depend on a
/// real provider hand-off. Startup validation refuses this mode in
/// production configurations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthenticationMode {
    Strict,
    DevelopmentFallback,
}

impl AuthenticationMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::DevelopmentFallback => "development-fallback",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "strict" => Some(Self::Strict),
            "development-fallback" => Some(Self::DevelopmentFallback),
            _ => None,
        }
    }
}

/// Generate a 256-bit random token, URL-safe base64 without padding.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Token-exchange request fields.
#[derive(Clone, Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    pub grant_type: String,
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
}

/// Successful token-exchange response.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
    pub id_token: String,
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("unsupported grant type: {0:?}")]
    UnsupportedGrantType(String),
    #[error(transparent)]
    Code(#[from] CodeRedeemError),
    #[error(transparent)]
    Token(#[from] AccessTokenError),
    #[error("subject not found in the identity store")]
    UnknownSubject,
    #[error(transparent)]
    Signing(#[from] crate::token::Error),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Broker + issuer facade over the code/token stores.
pub struct OauthService {
    codes: Arc<CodeStore>,
    tokens: Arc<TokenStore>,
    signer: Arc<TokenSigner>,
    identities: Arc<dyn IdentityStore>,
    mode: AuthenticationMode,
    id_token_ttl: Duration,
}

impl OauthService {
    #[must_use]
    pub fn new(
        codes: Arc<CodeStore>,
        tokens: Arc<TokenStore>,
        signer: Arc<TokenSigner>,
        identities: Arc<dyn IdentityStore>,
        mode: AuthenticationMode,
        id_token_ttl: Duration,
    ) -> Self {
        Self {
            codes,
            tokens,
            signer,
            identities,
            mode,
            id_token_ttl,
        }
    }

    #[must_use]
    pub fn codes(&self) -> &Arc<CodeStore> {
        &self.codes
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Mint an authorization code bound to the given triple.
    pub async fn issue_code(
        &self,
        client_id: &str,
        redirect_uri: &str,
        subject_id: &str,
    ) -> String {
        let code = self.codes.issue(client_id, redirect_uri, subject_id).await;
        debug!(client_id, subject_id, "issued authorization code");
        code
    }

    /// Exchange a redeemed code for an access token and ID assertion.
    ///
    /// # Errors
    /// Propagates broker failures unchanged; rejects any grant type other
    /// than `authorization_code` before touching state.
    pub async fn exchange(&self, request: &ExchangeRequest) -> Result<TokenGrant, ExchangeError> {
        if request.grant_type != GRANT_TYPE_AUTHORIZATION_CODE {
            return Err(ExchangeError::UnsupportedGrantType(
                request.grant_type.clone(),
            ));
        }

        let redeemed = self
            .codes
            .redeem(&request.code, &request.client_id, &request.redirect_uri)
            .await;
        let subject_id = match redeemed {
            Ok(subject_id) => subject_id,
            Err(CodeRedeemError::NotFound)
                if self.mode == AuthenticationMode::DevelopmentFallback =>
            {
                self.redeem_with_fallback(request).await?
            }
            Err(err) => return Err(err.into()),
        };

        let access_token = self.tokens.insert(&subject_id, &request.client_id).await;

        let identity = self.identities.find_by_external_id(&subject_id).await?;
        let display_name = identity.as_ref().map(Identity::display_label);
        let id_token = self.signer.mint_id_token(
            &subject_id,
            &request.client_id,
            display_name.as_deref(),
            self.id_token_ttl,
        )?;

        Ok(TokenGrant {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.expires_in_seconds(),
            scope: DEFAULT_SCOPE.to_string(),
            id_token,
        })
    }

    /// Resolve an access token to the subject's identity profile.
    ///
    /// # Errors
    /// `Token` for unknown/expired tokens, `UnknownSubject` when the store no
    /// longer holds the subject, `Storage` when the store is unreachable
    /// (which callers treat as unauthenticated, never as access).
    pub async fn user_info(&self, access_token: &str) -> Result<Identity, ExchangeError> {
        let entry = self.tokens.lookup(access_token).await?;
        let identity = self.identities.find_by_external_id(&entry.subject_id).await?;
        identity.ok_or(ExchangeError::UnknownSubject)
    }

    /// The development-only unknown-code path: bind the presented code to a
    /// freshly upserted local identity, then redeem it normally.
    async fn redeem_with_fallback(
        &self,
        request: &ExchangeRequest,
    ) -> Result<String, ExchangeError> {
        warn!(
            code_prefix = &request.code[..request.code.len().min(8)],
            "unknown authorization code; applying development fallback"
        );
        let identity = self
            .identities
            .upsert(
                DEV_FALLBACK_EXTERNAL_ID,
                IdentityProfile {
                    display_name: Some("Development User".to_string()),
                    email: Some("dev@localhost".to_string()),
                    login_method: Some("dev".to_string()),
                },
            )
            .await?;
        self.codes
            .seed(
                &request.code,
                &request.client_id,
                &request.redirect_uri,
                &identity.external_id,
            )
            .await;
        Ok(self
            .codes
            .redeem(&request.code, &request.client_id, &request.redirect_uri)
            .await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{
        AuthenticationMode, CodeRedeemError, CodeStore, ExchangeError, ExchangeRequest,
        OauthService, TokenStore, generate_token,
    };
    use crate::identity::{IdentityProfile, IdentityStore, MemoryIdentityStore};
    use crate::token::TokenSigner;
    use chrono::Duration;
    use secrecy::SecretString;
    use std::sync::Arc;

    async fn service(mode: AuthenticationMode) -> (OauthService, Arc<MemoryIdentityStore>) {
        let identities = Arc::new(MemoryIdentityStore::new());
        identities
            .upsert(
                "google:42",
                IdentityProfile {
                    display_name: Some("Alice".to_string()),
                    email: Some("alice@example.com".to_string()),
                    login_method: Some("google".to_string()),
                },
            )
            .await
            .unwrap();
        let signer = Arc::new(TokenSigner::new(
            SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
            "https://idp.wukong.dev".to_string(),
        ));
        let service = OauthService::new(
            Arc::new(CodeStore::new(Duration::minutes(10))),
            Arc::new(TokenStore::new(Duration::hours(1))),
            signer,
            identities.clone(),
            mode,
            Duration::hours(1),
        );
        (service, identities)
    }

    fn request(code: &str) -> ExchangeRequest {
        ExchangeRequest {
            grant_type: "authorization_code".to_string(),
            code: code.to_string(),
            client_id: "app-1".to_string(),
            redirect_uri: "https://x/cb".to_string(),
        }
    }

    #[tokio::test]
    async fn exchange_mints_tokens() {
        let (service, _) = service(AuthenticationMode::Strict).await;
        let code = service.issue_code("app-1", "https://x/cb", "google:42").await;
        let grant = service.exchange(&request(&code)).await.unwrap();

        assert_eq!(grant.token_type, "Bearer");
        assert_eq!(grant.expires_in, 3600);
        assert_eq!(grant.scope, "openid profile email");

        let identity = service.user_info(&grant.access_token).await.unwrap();
        assert_eq!(identity.external_id, "google:42");
    }

    #[tokio::test]
    async fn exchange_rejects_bad_grant_type_before_state() {
        let (service, _) = service(AuthenticationMode::Strict).await;
        let code = service.issue_code("app-1", "https://x/cb", "google:42").await;
        let mut bad = request(&code);
        bad.grant_type = "client_credentials".to_string();

        let err = service.exchange(&bad).await.unwrap_err();
        assert!(matches!(err, ExchangeError::UnsupportedGrantType(_)));

        // The code must still be redeemable afterwards.
        service.exchange(&request(&code)).await.unwrap();
    }

    #[tokio::test]
    async fn exchange_propagates_broker_errors() {
        let (service, _) = service(AuthenticationMode::Strict).await;
        let err = service.exchange(&request("unknown")).await.unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Code(CodeRedeemError::NotFound)
        ));

        let code = service.issue_code("app-1", "https://x/cb", "google:42").await;
        service.exchange(&request(&code)).await.unwrap();
        let err = service.exchange(&request(&code)).await.unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Code(CodeRedeemError::AlreadyUsed)
        ));
    }

    #[tokio::test]
    async fn development_fallback_synthesizes_identity() {
        let (service, identities) = service(AuthenticationMode::DevelopmentFallback).await;
        let grant = service.exchange(&request("made-up-code")).await.unwrap();

        let identity = service.user_info(&grant.access_token).await.unwrap();
        assert_eq!(identity.external_id, super::DEV_FALLBACK_EXTERNAL_ID);
        assert!(
            identities
                .find_by_external_id(super::DEV_FALLBACK_EXTERNAL_ID)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn strict_mode_never_synthesizes() {
        let (service, identities) = service(AuthenticationMode::Strict).await;
        assert!(service.exchange(&request("made-up-code")).await.is_err());
        assert!(
            identities
                .find_by_external_id(super::DEV_FALLBACK_EXTERNAL_ID)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn id_token_binds_audience() {
        let (service, _) = service(AuthenticationMode::Strict).await;
        let signer = TokenSigner::new(
            SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
            "https://idp.wukong.dev".to_string(),
        );
        let code = service.issue_code("app-1", "https://x/cb", "google:42").await;
        let grant = service.exchange(&request(&code)).await.unwrap();

        let claims = signer.verify_id_token(&grant.id_token, "app-1").unwrap();
        assert_eq!(claims.sub, "google:42");
        assert_eq!(claims.name.as_deref(), Some("Alice"));
        assert!(signer.verify_id_token(&grant.id_token, "app-2").is_err());
    }

    #[test]
    fn generate_token_has_enough_entropy() {
        let token = generate_token();
        assert!(token.len() >= 43);
        assert_ne!(token, generate_token());
    }

    #[test]
    fn authentication_mode_from_str() {
        assert_eq!(
            AuthenticationMode::from_str("strict"),
            Some(AuthenticationMode::Strict)
        );
        assert_eq!(
            AuthenticationMode::from_str("development-fallback"),
            Some(AuthenticationMode::DevelopmentFallback)
        );
        assert_eq!(AuthenticationMode::from_str("mock"), None);
    }
}

//! Signed credential minting and verification.
//!
//! Two credential shapes share one HS256 signing key:
//!
//! - the **session credential**, the long-lived self-contained assertion
//!   carried by the console's cookie, and
//! - the **ID assertion** returned from the token exchange, binding a
//!   subject to the client it authenticated for.
//!
//! Verification is pure: signature + claim checks only, no storage access,
//! no locking. Anything malformed, tampered, or expired is simply
//! unauthenticated.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims carried by the console session credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// Stable external id of the subject.
    pub sub: String,
    /// Client the credential was minted for.
    pub aud: String,
    /// Display name shown by the console without a store lookup.
    pub name: String,
    /// Device session named by this credential, for liveness checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by the ID assertion minted at token exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid audience")]
    InvalidAudience,
    #[error("failed to encode claims")]
    Encode(#[source] jsonwebtoken::errors::Error),
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidAudience => Self::InvalidAudience,
            _ => Self::TokenFormat,
        }
    }
}

/// Mints and verifies the console's signed credentials.
pub struct TokenSigner {
    secret: SecretString,
    issuer: String,
}

impl TokenSigner {
    #[must_use]
    pub fn new(secret: SecretString, issuer: String) -> Self {
        Self { secret, issuer }
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.secret.expose_secret().as_bytes())
    }

    fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.secret.expose_secret().as_bytes())
    }

    /// Mint the long-lived session credential.
    ///
    /// # Errors
    /// Returns an error if claim serialization or signing fails.
    pub fn mint_session(
        &self,
        subject_id: &str,
        client_id: &str,
        display_name: &str,
        device_session_id: Option<&str>,
        ttl: Duration,
    ) -> Result<String, Error> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: subject_id.to_string(),
            aud: client_id.to_string(),
            name: display_name.to_string(),
            sid: device_session_id.map(str::to_string),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key()).map_err(Error::Encode)
    }

    /// Verify a session credential.
    ///
    /// Returns `None` on malformed input, signature mismatch, missing
    /// required claims, or an `exp` in the past. Pure and side-effect-free;
    /// safe to call on every request.
    #[must_use]
    pub fn verify_session(&self, token: &str) -> Option<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "aud"]);

        let data = decode::<SessionClaims>(token, &self.decoding_key(), &validation).ok()?;
        if data.claims.sub.is_empty() || data.claims.aud.is_empty() {
            return None;
        }
        Some(data.claims)
    }

    /// Mint the ID assertion bound to `client_id`.
    ///
    /// # Errors
    /// Returns an error if claim serialization or signing fails.
    pub fn mint_id_token(
        &self,
        subject_id: &str,
        client_id: &str,
        display_name: Option<&str>,
        ttl: Duration,
    ) -> Result<String, Error> {
        let now = Utc::now();
        let claims = IdTokenClaims {
            iss: self.issuer.clone(),
            sub: subject_id.to_string(),
            aud: client_id.to_string(),
            name: display_name.map(str::to_string),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key()).map_err(Error::Encode)
    }

    /// Verify an ID assertion against the expected audience.
    ///
    /// Same contract as session verification plus the `aud` equality check.
    ///
    /// # Errors
    /// Returns the specific failure so callers can log it; all variants mean
    /// "unauthenticated" to the caller.
    pub fn verify_id_token(
        &self,
        token: &str,
        expected_audience: &str,
    ) -> Result<IdTokenClaims, Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(&[expected_audience]);
        validation.set_required_spec_claims(&["exp", "sub", "aud"]);

        let data = decode::<IdTokenClaims>(token, &self.decoding_key(), &validation)?;
        if data.claims.sub.is_empty() {
            return Err(Error::TokenFormat);
        }
        Ok(data.claims)
    }
}

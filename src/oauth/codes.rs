//! Single-use authorization codes.
//!
//! Codes bind a `(client_id, redirect_uri, subject)` triple for a few
//! minutes. The store is a process-local map; every check-then-mark runs
//! inside one mutex guard scope, so two concurrent redeemers of the same
//! code resolve to exactly one success and one `AlreadyUsed`.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use super::generate_token;

/// A stored authorization code and its binding.
#[derive(Clone, Debug)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub subject_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodeRedeemError {
    #[error("authorization code not found")]
    NotFound,
    #[error("authorization code has already been used")]
    AlreadyUsed,
    #[error("authorization code has expired")]
    Expired,
    #[error("client id does not match the code binding")]
    ClientMismatch,
    #[error("redirect URI does not match the code binding")]
    RedirectMismatch,
}

/// Process-local authorization-code store.
///
/// Correctness never depends on the background sweep: expiry and the `used`
/// flag are enforced at redemption time. A shared external store can replace
/// this for multi-instance deployments as long as redeem keeps the same
/// exactly-once contract.
#[derive(Debug)]
pub struct CodeStore {
    ttl: Duration,
    codes: Mutex<HashMap<String, AuthorizationCode>>,
}

impl CodeStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            codes: Mutex::new(HashMap::new()),
        }
    }

    /// Mint and store a fresh code bound to the given triple.
    pub async fn issue(&self, client_id: &str, redirect_uri: &str, subject_id: &str) -> String {
        let code = generate_token();
        let now = Utc::now();
        let entry = AuthorizationCode {
            code: code.clone(),
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            subject_id: subject_id.to_string(),
            issued_at: now,
            expires_at: now + self.ttl,
            used: false,
        };
        self.codes.lock().await.insert(code.clone(), entry);
        code
    }

    /// Store a caller-supplied code. Used by the development fallback and by
    /// tests that need a known code value.
    pub async fn seed(&self, code: &str, client_id: &str, redirect_uri: &str, subject_id: &str) {
        let now = Utc::now();
        let entry = AuthorizationCode {
            code: code.to_string(),
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            subject_id: subject_id.to_string(),
            issued_at: now,
            expires_at: now + self.ttl,
            used: false,
        };
        self.codes.lock().await.insert(code.to_string(), entry);
    }

    /// Redeem a code, atomically marking it used.
    ///
    /// Check order: existence, replay, expiry, client binding, redirect
    /// binding. The whole sequence holds the store lock, so no await point
    /// can interleave between the checks and the `used` flip.
    ///
    /// # Errors
    /// Returns the specific protocol violation; the first concurrent caller
    /// wins, every later one sees `AlreadyUsed`.
    pub async fn redeem(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<String, CodeRedeemError> {
        let mut codes = self.codes.lock().await;
        let Some(entry) = codes.get_mut(code) else {
            return Err(CodeRedeemError::NotFound);
        };
        if entry.used {
            return Err(CodeRedeemError::AlreadyUsed);
        }
        if entry.expires_at <= Utc::now() {
            codes.remove(code);
            return Err(CodeRedeemError::Expired);
        }
        if entry.client_id != client_id {
            return Err(CodeRedeemError::ClientMismatch);
        }
        if entry.redirect_uri != redirect_uri {
            return Err(CodeRedeemError::RedirectMismatch);
        }
        entry.used = true;
        Ok(entry.subject_id.clone())
    }

    /// Drop expired entries. Housekeeping only.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut codes = self.codes.lock().await;
        let before = codes.len();
        codes.retain(|_, entry| entry.expires_at > now);
        before - codes.len()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.codes.lock().await.len()
    }
}

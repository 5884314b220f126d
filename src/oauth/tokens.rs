//! Opaque access tokens.
//!
//! An access token is a bearer capability for the user-info lookup: random,
//! stored server-side with its own TTL, and never parseable by the holder.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use super::generate_token;

/// A stored access token and its binding.
#[derive(Clone, Debug)]
pub struct AccessToken {
    pub token: String,
    pub subject_id: String,
    pub client_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessTokenError {
    #[error("invalid access token")]
    Invalid,
    #[error("access token has expired")]
    Expired,
}

/// Process-local access-token store.
#[derive(Debug)]
pub struct TokenStore {
    ttl: Duration,
    tokens: Mutex<HashMap<String, AccessToken>>,
}

impl TokenStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Seconds until a freshly minted token expires.
    #[must_use]
    pub fn expires_in_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Mint and store a fresh token for the subject/client pair.
    pub async fn insert(&self, subject_id: &str, client_id: &str) -> String {
        let token = generate_token();
        let entry = AccessToken {
            token: token.clone(),
            subject_id: subject_id.to_string(),
            client_id: client_id.to_string(),
            expires_at: Utc::now() + self.ttl,
        };
        self.tokens.lock().await.insert(token.clone(), entry);
        token
    }

    /// Resolve a token, dropping it eagerly when expired.
    ///
    /// # Errors
    /// `Invalid` for unknown tokens, `Expired` for known-but-stale ones.
    pub async fn lookup(&self, token: &str) -> Result<AccessToken, AccessTokenError> {
        let mut tokens = self.tokens.lock().await;
        let Some(entry) = tokens.get(token) else {
            return Err(AccessTokenError::Invalid);
        };
        if entry.expires_at <= Utc::now() {
            tokens.remove(token);
            return Err(AccessTokenError::Expired);
        }
        Ok(entry.clone())
    }

    /// Drop expired entries. Housekeeping only.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut tokens = self.tokens.lock().await;
        let before = tokens.len();
        tokens.retain(|_, entry| entry.expires_at > now);
        before - tokens.len()
    }
}

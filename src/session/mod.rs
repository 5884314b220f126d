//! Device-scoped session bookkeeping.
//!
//! The session credential is stateless; this layer adds what a pure signed
//! token cannot: remote visibility ("which devices am I signed in on?") and
//! real-time revocation. Each login records a device session whose opaque
//! identifier rides along in the credential; `is_live` is the final check
//! after signature verification.

pub mod memory;
pub mod models;
pub mod repo;

use anyhow::Result;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSeverity, AuditStore, record_best_effort};
pub use memory::MemoryDeviceSessionStore;
pub use models::{DeviceMeta, DeviceSession, device_name_from_user_agent};
pub use repo::PgDeviceSessionStore;

/// Storage seam for device sessions. Rows are soft-deleted only.
#[async_trait]
pub trait DeviceSessionStore: Send + Sync {
    async fn insert(&self, session: DeviceSession) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<DeviceSession>>;
    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<DeviceSession>>;
    async fn list_for_subject(&self, subject_id: &str) -> Result<Vec<DeviceSession>>;
    async fn set_inactive(&self, id: Uuid) -> Result<bool>;
    async fn set_all_inactive(&self, subject_id: &str) -> Result<usize>;
    async fn touch(&self, token_hash: &[u8], now: DateTime<Utc>) -> Result<()>;
}

#[derive(Debug, Error)]
pub enum RevokeError {
    #[error("session not found")]
    NotFound,
    #[error("session belongs to a different subject")]
    Forbidden,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Generate the opaque device-session identifier handed to the client.
/// Only its hash is stored.
#[must_use]
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a session identifier so raw values never touch storage.
#[must_use]
pub fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Device-session lifecycle: create, list, revoke, liveness.
pub struct SessionManager {
    store: Arc<dyn DeviceSessionStore>,
    audit: Arc<dyn AuditStore>,
    ttl: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn DeviceSessionStore>, audit: Arc<dyn AuditStore>, ttl: Duration) -> Self {
        Self { store, audit, ttl }
    }

    /// Record a new device session and return its opaque identifier.
    ///
    /// # Errors
    /// Returns an error if the store write fails.
    pub async fn create(&self, subject_id: &str, meta: DeviceMeta) -> Result<String> {
        let token = generate_session_token();
        let now = Utc::now();
        let device_name = meta.device_name.or_else(|| {
            meta.user_agent
                .as_deref()
                .map(device_name_from_user_agent)
        });
        let session = DeviceSession {
            id: Uuid::new_v4(),
            subject_id: subject_id.to_string(),
            token_hash: hash_session_token(&token),
            device_name,
            user_agent: meta.user_agent.clone(),
            ip_address: meta.ip_address.clone(),
            last_activity_at: now,
            expires_at: now + self.ttl,
            is_active: true,
        };
        self.store.insert(session).await?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(
                "session_created",
                format!(
                    "New session created from {}",
                    meta.ip_address.as_deref().unwrap_or("unknown")
                ),
            )
            .with_subject(subject_id)
            .with_ip_address(meta.ip_address)
            .with_user_agent(meta.user_agent),
        )
        .await;
        Ok(token)
    }

    /// All sessions for a subject, active or revoked, newest activity first.
    ///
    /// # Errors
    /// Returns an error if the store read fails.
    pub async fn list(&self, subject_id: &str) -> Result<Vec<DeviceSession>> {
        self.store.list_for_subject(subject_id).await
    }

    /// Revoke one session after an ownership check.
    ///
    /// # Errors
    /// `NotFound` for unknown ids, `Forbidden` when the session belongs to a
    /// different subject and `admin_override` is not set.
    pub async fn revoke(
        &self,
        session_id: Uuid,
        acting_subject: &str,
        admin_override: bool,
    ) -> Result<(), RevokeError> {
        let session = self
            .store
            .get(session_id)
            .await?
            .ok_or(RevokeError::NotFound)?;
        if session.subject_id != acting_subject && !admin_override {
            return Err(RevokeError::Forbidden);
        }
        self.store.set_inactive(session_id).await?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new("session_revoked", "Session revoked")
                .with_subject(session.subject_id),
        )
        .await;
        Ok(())
    }

    /// The "log out everywhere" operation.
    ///
    /// # Errors
    /// Returns an error if the store write fails.
    pub async fn revoke_all(&self, subject_id: &str) -> Result<usize> {
        let revoked = self.store.set_all_inactive(subject_id).await?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new("all_sessions_revoked", "All sessions revoked (remote logout)")
                .with_subject(subject_id)
                .with_severity(AuditSeverity::Warning),
        )
        .await;
        Ok(revoked)
    }

    /// Revoke the session named by its opaque identifier (logout path).
    ///
    /// # Errors
    /// Returns an error if the store access fails. Unknown tokens are a
    /// no-op: logout is idempotent.
    pub async fn revoke_by_token(&self, token: &str) -> Result<()> {
        let hash = hash_session_token(token);
        if let Some(session) = self.store.find_by_token_hash(&hash).await? {
            self.store.set_inactive(session.id).await?;
            record_best_effort(
                self.audit.as_ref(),
                AuditEvent::new("session_revoked", "Session revoked (logout)")
                    .with_subject(session.subject_id),
            )
            .await;
        }
        Ok(())
    }

    /// Liveness check layered on top of credential verification: the session
    /// exists, is active, and is not past expiry.
    ///
    /// # Errors
    /// Returns an error if the store read fails; callers fail closed.
    pub async fn is_live(&self, token: &str) -> Result<bool> {
        let hash = hash_session_token(token);
        let session = self.store.find_by_token_hash(&hash).await?;
        Ok(session.is_some_and(|session| session.is_live(Utc::now())))
    }

    /// Bump `last_activity_at` for a verified use. Never extends expiry.
    ///
    /// # Errors
    /// Returns an error if the store write fails.
    pub async fn touch(&self, token: &str) -> Result<()> {
        let hash = hash_session_token(token);
        self.store.touch(&hash, Utc::now()).await
    }
}

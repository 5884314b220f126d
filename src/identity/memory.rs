//! In-process identity store for tests and single-instance deployments.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Identity, IdentityProfile, IdentityStore, Role};

/// Identity store backed by a process-local map keyed by external id.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identities: Mutex<HashMap<String, Identity>>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Identity>> {
        let identities = self.identities.lock().await;
        Ok(identities.get(external_id).cloned())
    }

    async fn upsert(&self, external_id: &str, profile: IdentityProfile) -> Result<Identity> {
        let mut identities = self.identities.lock().await;
        let now = Utc::now();
        let identity = identities
            .entry(external_id.to_string())
            .and_modify(|existing| {
                // Only overwrite profile fields the provider actually supplied.
                if profile.display_name.is_some() {
                    existing.display_name = profile.display_name.clone();
                }
                if profile.email.is_some() {
                    existing.email = profile.email.clone();
                }
                if profile.login_method.is_some() {
                    existing.login_method = profile.login_method.clone();
                }
                existing.last_signed_in = now;
            })
            .or_insert_with(|| Identity {
                id: Uuid::new_v4(),
                external_id: external_id.to_string(),
                display_name: profile.display_name.clone(),
                email: profile.email.clone(),
                login_method: profile.login_method.clone(),
                role: Role::User,
                last_signed_in: now,
            });
        Ok(identity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_creates_then_updates() {
        let store = MemoryIdentityStore::new();
        let created = store
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
        assert_eq!(created.role, Role::User);

        let updated = store
            .upsert(
                "google:42",
                IdentityProfile {
                    display_name: Some("Alice L.".to_string()),
                    ..IdentityProfile::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.display_name.as_deref(), Some("Alice L."));
        assert_eq!(updated.email.as_deref(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn find_missing_returns_none() {
        let store = MemoryIdentityStore::new();
        assert!(
            store
                .find_by_external_id("github:0")
                .await
                .unwrap()
                .is_none()
        );
    }
}

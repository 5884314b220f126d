//! In-process MFA store for tests and single-instance deployments.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{MfaSettings, MfaStore};

/// MFA store backed by a process-local map keyed by subject id.
#[derive(Debug, Default)]
pub struct MemoryMfaStore {
    settings: Mutex<HashMap<String, MfaSettings>>,
}

impl MemoryMfaStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MfaStore for MemoryMfaStore {
    async fn load(&self, subject_id: &str) -> Result<Option<MfaSettings>> {
        Ok(self.settings.lock().await.get(subject_id).cloned())
    }

    async fn enable(
        &self,
        subject_id: &str,
        secret: &str,
        code_hashes: &[Vec<u8>],
    ) -> Result<()> {
        let mut settings = self.settings.lock().await;
        settings.insert(
            subject_id.to_string(),
            MfaSettings {
                subject_id: subject_id.to_string(),
                totp_secret: Some(secret.to_string()),
                totp_enabled: true,
                backup_code_hashes: code_hashes.to_vec(),
                backup_codes_generated: true,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn disable(&self, subject_id: &str) -> Result<()> {
        let mut settings = self.settings.lock().await;
        if let Some(entry) = settings.get_mut(subject_id) {
            entry.totp_secret = None;
            entry.totp_enabled = false;
            entry.backup_code_hashes.clear();
            entry.backup_codes_generated = false;
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn consume_backup_code(&self, subject_id: &str, code_hash: &[u8]) -> Result<bool> {
        // Lookup and removal share one guard scope: two racing consumers of
        // the same code resolve to one success.
        let mut settings = self.settings.lock().await;
        let Some(entry) = settings.get_mut(subject_id) else {
            return Ok(false);
        };
        let Some(index) = entry
            .backup_code_hashes
            .iter()
            .position(|hash| hash == code_hash)
        else {
            return Ok(false);
        };
        entry.backup_code_hashes.remove(index);
        entry.updated_at = Utc::now();
        Ok(true)
    }

    async fn replace_backup_codes(&self, subject_id: &str, code_hashes: &[Vec<u8>]) -> Result<bool> {
        let mut settings = self.settings.lock().await;
        let Some(entry) = settings.get_mut(subject_id) else {
            return Ok(false);
        };
        if !entry.totp_enabled {
            return Ok(false);
        }
        entry.backup_code_hashes = code_hashes.to_vec();
        entry.backup_codes_generated = true;
        entry.updated_at = Utc::now();
        Ok(true)
    }
}

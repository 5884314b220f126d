//! In-process device-session store for tests and single-instance deployments.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{DeviceSession, DeviceSessionStore};

/// Device-session store backed by a process-local map keyed by row id.
#[derive(Debug, Default)]
pub struct MemoryDeviceSessionStore {
    sessions: Mutex<HashMap<Uuid, DeviceSession>>,
}

impl MemoryDeviceSessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceSessionStore for MemoryDeviceSessionStore {
    async fn insert(&self, session: DeviceSession) -> Result<()> {
        self.sessions.lock().await.insert(session.id, session);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<DeviceSession>> {
        Ok(self.sessions.lock().await.get(&id).cloned())
    }

    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<DeviceSession>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .values()
            .find(|session| session.token_hash == token_hash)
            .cloned())
    }

    async fn list_for_subject(&self, subject_id: &str) -> Result<Vec<DeviceSession>> {
        let sessions = self.sessions.lock().await;
        let mut result: Vec<DeviceSession> = sessions
            .values()
            .filter(|session| session.subject_id == subject_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(result)
    }

    async fn set_inactive(&self, id: Uuid) -> Result<bool> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&id) {
            Some(session) => {
                session.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_all_inactive(&self, subject_id: &str) -> Result<usize> {
        let mut sessions = self.sessions.lock().await;
        let mut revoked = 0;
        for session in sessions.values_mut() {
            if session.subject_id == subject_id && session.is_active {
                session.is_active = false;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn touch(&self, token_hash: &[u8], now: DateTime<Utc>) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions
            .values_mut()
            .find(|session| session.token_hash == token_hash)
        {
            session.last_activity_at = now;
        }
        Ok(())
    }
}

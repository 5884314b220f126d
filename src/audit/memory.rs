//! In-process audit sink for tests and single-instance deployments.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{AuditEvent, AuditStore};

/// Audit sink backed by a process-local append-only vector.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of recorded events, for assertions in tests.
    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }

    async fn list_for_subject(&self, subject_id: &str) -> Result<Vec<AuditEvent>> {
        let events = self.events.lock().await;
        Ok(events
            .iter()
            .filter(|event| event.subject_id.as_deref() == Some(subject_id))
            .cloned()
            .collect())
    }
}

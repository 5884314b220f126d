//! Append-only audit trail for security-relevant outcomes.
//!
//! Every MFA enable/disable, backup-code consumption, session revocation,
//! and failed verification attempt produces an event. Writes are best-effort:
//! a degraded audit sink is logged, never propagated into the primary
//! operation.

pub mod memory;
pub mod repo;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

pub use memory::MemoryAuditStore;
pub use repo::PgAuditStore;

/// Severity attached to an audit event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
}

impl AuditSeverity {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }

    pub(crate) fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }
}

/// A single write-once audit record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub subject_id: Option<String>,
    pub event_type: String,
    pub description: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub severity: AuditSeverity,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(event_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            subject_id: None,
            event_type: event_type.into(),
            description: description.into(),
            ip_address: None,
            user_agent: None,
            metadata: None,
            severity: AuditSeverity::Info,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_ip_address(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Append-only sink for audit events.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<()>;
    async fn list_for_subject(&self, subject_id: &str) -> Result<Vec<AuditEvent>>;
}

/// Record an event, logging (not propagating) sink failures.
pub async fn record_best_effort(store: &dyn AuditStore, event: AuditEvent) {
    let event_type = event.event_type.clone();
    if let Err(err) = store.record(event).await {
        error!("failed to record audit event {event_type}: {err}");
    }
}

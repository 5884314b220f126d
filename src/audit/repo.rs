//! Postgres-backed audit sink.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::{AuditEvent, AuditSeverity, AuditStore};

/// Audit sink over the console's `audit_events` table.
#[derive(Clone, Debug)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        let query = r"
            INSERT INTO audit_events
                (subject_id, event_type, description, ip_address, user_agent, metadata, severity, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(event.subject_id)
            .bind(event.event_type)
            .bind(event.description)
            .bind(event.ip_address)
            .bind(event.user_agent)
            .bind(event.metadata)
            .bind(event.severity.as_str())
            .bind(event.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert audit event")?;
        Ok(())
    }

    async fn list_for_subject(&self, subject_id: &str) -> Result<Vec<AuditEvent>> {
        let query = r"
            SELECT subject_id, event_type, description, ip_address, user_agent, metadata, severity, created_at
            FROM audit_events
            WHERE subject_id = $1
            ORDER BY created_at DESC
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(subject_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list audit events")?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let severity: String = row.get("severity");
                AuditEvent {
                    subject_id: row.get("subject_id"),
                    event_type: row.get("event_type"),
                    description: row.get("description"),
                    ip_address: row.get("ip_address"),
                    user_agent: row.get("user_agent"),
                    metadata: row.get("metadata"),
                    severity: AuditSeverity::from_str(&severity).unwrap_or(AuditSeverity::Info),
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }
}

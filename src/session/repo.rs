//! Postgres-backed device-session store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

use super::{DeviceSession, DeviceSessionStore};

const SESSION_COLUMNS: &str = "id, subject_id, token_hash, device_name, user_agent, ip_address, \
                               last_activity_at, expires_at, is_active";

/// Device-session store over the console's `device_sessions` table.
#[derive(Clone, Debug)]
pub struct PgDeviceSessionStore {
    pool: PgPool,
}

impl PgDeviceSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceSessionStore for PgDeviceSessionStore {
    async fn insert(&self, session: DeviceSession) -> Result<()> {
        let query = r"
            INSERT INTO device_sessions
                (id, subject_id, token_hash, device_name, user_agent, ip_address,
                 last_activity_at, expires_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session.id)
            .bind(session.subject_id)
            .bind(session.token_hash)
            .bind(session.device_name)
            .bind(session.user_agent)
            .bind(session.ip_address)
            .bind(session.last_activity_at)
            .bind(session.expires_at)
            .bind(session.is_active)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert device session")?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<DeviceSession>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM device_sessions WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, DeviceSession>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup device session")
    }

    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<DeviceSession>> {
        let query =
            format!("SELECT {SESSION_COLUMNS} FROM device_sessions WHERE token_hash = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, DeviceSession>(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup device session by token hash")
    }

    async fn list_for_subject(&self, subject_id: &str) -> Result<Vec<DeviceSession>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM device_sessions \
             WHERE subject_id = $1 ORDER BY last_activity_at DESC"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, DeviceSession>(&query)
            .bind(subject_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list device sessions")
    }

    async fn set_inactive(&self, id: Uuid) -> Result<bool> {
        let query = "UPDATE device_sessions SET is_active = FALSE WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke device session")?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_all_inactive(&self, subject_id: &str) -> Result<usize> {
        let query = r"
            UPDATE device_sessions
            SET is_active = FALSE
            WHERE subject_id = $1
              AND is_active
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(subject_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke all device sessions")?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }

    async fn touch(&self, token_hash: &[u8], now: DateTime<Utc>) -> Result<()> {
        // Activity tracking only; never extends expires_at.
        let query = r"
            UPDATE device_sessions
            SET last_activity_at = $2
            WHERE token_hash = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token_hash)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update device session activity")?;
        Ok(())
    }
}

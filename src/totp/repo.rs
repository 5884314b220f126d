//! Postgres-backed MFA store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::Instrument;

use super::{MfaSettings, MfaStore};

/// MFA store over the console's `user_mfa_settings` table.
#[derive(Clone, Debug)]
pub struct PgMfaStore {
    pool: PgPool,
}

impl PgMfaStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MfaStore for PgMfaStore {
    async fn load(&self, subject_id: &str) -> Result<Option<MfaSettings>> {
        let query = r"
            SELECT subject_id, totp_secret, totp_enabled, backup_code_hashes,
                   backup_codes_generated, updated_at
            FROM user_mfa_settings
            WHERE subject_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, MfaSettings>(query)
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load MFA settings")
    }

    async fn enable(
        &self,
        subject_id: &str,
        secret: &str,
        code_hashes: &[Vec<u8>],
    ) -> Result<()> {
        let query = r"
            INSERT INTO user_mfa_settings
                (subject_id, totp_secret, totp_enabled, backup_code_hashes, backup_codes_generated, updated_at)
            VALUES ($1, $2, TRUE, $3, TRUE, NOW())
            ON CONFLICT (subject_id) DO UPDATE SET
                totp_secret = EXCLUDED.totp_secret,
                totp_enabled = TRUE,
                backup_code_hashes = EXCLUDED.backup_code_hashes,
                backup_codes_generated = TRUE,
                updated_at = NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(subject_id)
            .bind(secret)
            .bind(code_hashes)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to enable MFA settings")?;
        Ok(())
    }

    async fn disable(&self, subject_id: &str) -> Result<()> {
        let query = r"
            UPDATE user_mfa_settings
            SET totp_secret = NULL,
                totp_enabled = FALSE,
                backup_code_hashes = '{}',
                backup_codes_generated = FALSE,
                updated_at = NOW()
            WHERE subject_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(subject_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to disable MFA settings")?;
        Ok(())
    }

    async fn consume_backup_code(&self, subject_id: &str, code_hash: &[u8]) -> Result<bool> {
        // Single statement so concurrent consumers of the same code resolve
        // to one success; array_remove drops every copy of the matched hash.
        let query = r"
            UPDATE user_mfa_settings
            SET backup_code_hashes = array_remove(backup_code_hashes, $2),
                updated_at = NOW()
            WHERE subject_id = $1
              AND $2 = ANY(backup_code_hashes)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(subject_id)
            .bind(code_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume backup code")?;
        Ok(result.rows_affected() == 1)
    }

    async fn replace_backup_codes(&self, subject_id: &str, code_hashes: &[Vec<u8>]) -> Result<bool> {
        let query = r"
            UPDATE user_mfa_settings
            SET backup_code_hashes = $2,
                backup_codes_generated = TRUE,
                updated_at = NOW()
            WHERE subject_id = $1
              AND totp_enabled
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(subject_id)
            .bind(code_hashes)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to replace backup codes")?;
        Ok(result.rows_affected() == 1)
    }
}

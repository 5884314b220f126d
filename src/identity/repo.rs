//! Postgres-backed identity store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;

use super::{Identity, IdentityProfile, IdentityStore, Role};

/// Identity store over the console's `users` table.
#[derive(Clone, Debug)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn identity_from_row(row: &PgRow) -> Result<Identity, sqlx::Error> {
    let role: String = row.try_get("role")?;
    Ok(Identity {
        id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        login_method: row.try_get("login_method")?,
        role: Role::from_str(&role).unwrap_or(Role::User),
        last_signed_in: row.try_get("last_signed_in")?,
    })
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Identity>> {
        let query = r"
            SELECT id, external_id, display_name, email, login_method, role::text AS role, last_signed_in
            FROM users
            WHERE external_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup identity")?;

        row.map(|row| identity_from_row(&row))
            .transpose()
            .context("failed to decode identity row")
    }

    async fn upsert(&self, external_id: &str, profile: IdentityProfile) -> Result<Identity> {
        // COALESCE keeps existing profile fields when the provider omits them.
        let query = r"
            INSERT INTO users (external_id, display_name, email, login_method, last_signed_in)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (external_id) DO UPDATE SET
                display_name = COALESCE(EXCLUDED.display_name, users.display_name),
                email = COALESCE(EXCLUDED.email, users.email),
                login_method = COALESCE(EXCLUDED.login_method, users.login_method),
                last_signed_in = NOW()
            RETURNING id, external_id, display_name, email, login_method, role::text AS role, last_signed_in
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(external_id)
            .bind(profile.display_name)
            .bind(profile.email)
            .bind(profile.login_method)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to upsert identity")?;

        identity_from_row(&row).context("failed to decode upserted identity row")
    }
}

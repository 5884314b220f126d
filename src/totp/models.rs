//! MFA settings rows.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Row, postgres::PgRow};

/// Per-subject second-factor state.
///
/// `totp_enabled == true` implies `totp_secret` is present; both stores
/// enforce that at enable time. Backup codes are stored hashed.
#[derive(Debug, Clone)]
pub struct MfaSettings {
    pub subject_id: String,
    pub totp_secret: Option<String>,
    pub totp_enabled: bool,
    pub backup_code_hashes: Vec<Vec<u8>>,
    pub backup_codes_generated: bool,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MfaSettings {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            subject_id: row.try_get("subject_id")?,
            totp_secret: row.try_get("totp_secret")?,
            totp_enabled: row.try_get("totp_enabled")?,
            backup_code_hashes: row.try_get("backup_code_hashes")?,
            backup_codes_generated: row.try_get("backup_codes_generated")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

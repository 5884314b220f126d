//! Device-session rows and device metadata helpers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Row, postgres::PgRow};
use utoipa::ToSchema;
use uuid::Uuid;

/// One logged-in device/browser. Never hard-deleted; revocation flips
/// `is_active` so the audit trail survives.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeviceSession {
    pub id: Uuid,
    pub subject_id: String,
    /// SHA-256 of the opaque session identifier; the raw value never lands
    /// in storage.
    #[serde(skip)]
    pub token_hash: Vec<u8>,
    pub device_name: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

impl DeviceSession {
    /// Liveness: active and not past expiry.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

impl<'r> FromRow<'r, PgRow> for DeviceSession {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            subject_id: row.try_get("subject_id")?,
            token_hash: row.try_get("token_hash")?,
            device_name: row.try_get("device_name")?,
            user_agent: row.try_get("user_agent")?,
            ip_address: row.try_get("ip_address")?,
            last_activity_at: row.try_get("last_activity_at")?,
            expires_at: row.try_get("expires_at")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

/// Device metadata captured at login completion.
#[derive(Debug, Clone, Default)]
pub struct DeviceMeta {
    pub device_name: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Derive a human-readable device name from a User-Agent header.
#[must_use]
pub fn device_name_from_user_agent(user_agent: &str) -> String {
    let browser = if user_agent.contains("Edg") {
        "Edge"
    } else if user_agent.contains("Chrome") {
        "Chrome"
    } else if user_agent.contains("Firefox") {
        "Firefox"
    } else if user_agent.contains("Safari") {
        "Safari"
    } else {
        "Unknown Browser"
    };

    let os = if user_agent.contains("Windows") {
        Some("Windows")
    } else if user_agent.contains("Mac") {
        Some("macOS")
    } else if user_agent.contains("Android") {
        Some("Android")
    } else if user_agent.contains("iPhone") || user_agent.contains("iPad") {
        Some("iOS")
    } else if user_agent.contains("Linux") {
        Some("Linux")
    } else {
        None
    };

    match os {
        Some(os) => format!("{browser} on {os}"),
        None => browser.to_string(),
    }
}

//! Identity store seam.
//!
//! The console's user store owns identities; this crate only resolves them by
//! their stable external id and upserts profile data after a successful
//! primary authentication. External ids have the form
//! `{provider}:{provider_user_id}`; the email provider uses the address as
//! the provider user id.

pub mod memory;
pub mod repo;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub use memory::MemoryIdentityStore;
pub use repo::PgIdentityStore;

/// Console role attached to an identity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    pub(crate) fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

/// A user identity as owned by the console's user store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub external_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub login_method: Option<String>,
    pub role: Role,
    pub last_signed_in: DateTime<Utc>,
}

impl Identity {
    /// Display name fallback chain: name, then email local part, then the
    /// external id.
    #[must_use]
    pub fn display_label(&self) -> String {
        if let Some(name) = &self.display_name
            && !name.is_empty()
        {
            return name.clone();
        }
        if let Some(email) = &self.email
            && let Some(local) = email.split('@').next()
            && !local.is_empty()
        {
            return local.to_string();
        }
        self.external_id.clone()
    }
}

/// Profile fields supplied by a provider hand-off, applied via upsert.
#[derive(Clone, Debug, Default)]
pub struct IdentityProfile {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub login_method: Option<String>,
}

/// Read/upsert access to the console's user store.
///
/// Implementations never delete identities. `upsert` inserts a new identity
/// (role `user`) or refreshes the profile fields and `last_signed_in` of an
/// existing one, keyed by `external_id`.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Identity>>;
    async fn upsert(&self, external_id: &str, profile: IdentityProfile) -> Result<Identity>;
}

/// Build the stable external id for a provider identity.
#[must_use]
pub fn external_id(provider: &str, provider_user_id: &str) -> String {
    format!("{provider}:{provider_user_id}")
}

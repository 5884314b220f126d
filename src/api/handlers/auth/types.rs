//! Request/response types for the auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::identity::Role;

/// Profile returned for an active session.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub subject_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub role: Role,
}

/// Body for finishing MFA enrollment with staged material.
#[derive(Debug, Deserialize, ToSchema)]
pub struct MfaEnrollFinishRequest {
    pub secret: String,
    pub backup_codes: Vec<String>,
}

/// Body for verifying a TOTP or backup code.
#[derive(Debug, Deserialize, ToSchema)]
pub struct MfaVerifyRequest {
    pub code: String,
}

/// Current MFA state for the settings page.
#[derive(Debug, Serialize, ToSchema)]
pub struct MfaStatusResponse {
    pub enabled: bool,
    pub backup_codes_remaining: usize,
}

/// Freshly regenerated backup codes, shown once.
#[derive(Debug, Serialize, ToSchema)]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

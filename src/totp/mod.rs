//! Multi-factor authentication service.
//!
//! A subject's second factor is a TOTP shared secret (6 digits, 30-second
//! step, the interoperable default every authenticator app speaks) plus a
//! pool of single-use backup codes. Enrollment is staged: `begin_enrollment`
//! persists nothing, `confirm_enrollment` commits the secret and pool once
//! the caller has shown the secret to the user.

pub mod backup;
pub mod memory;
pub mod models;
pub mod repo;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::audit::{AuditEvent, AuditSeverity, AuditStore, record_best_effort};
pub use backup::{generate_backup_codes, hash_backup_code, normalize_backup_code};
pub use memory::MemoryMfaStore;
pub use models::MfaSettings;
pub use repo::PgMfaStore;

/// One step = 30 seconds; codes are 6 digits.
const TOTP_DIGITS: usize = 6;
const TOTP_STEP_SECONDS: u64 = 30;
/// Tolerance of ±2 steps (±60 s) absorbs client clock drift.
const TOTP_SKEW_STEPS: u8 = 2;

/// Per-subject state access for the MFA service.
#[async_trait]
pub trait MfaStore: Send + Sync {
    async fn load(&self, subject_id: &str) -> Result<Option<MfaSettings>>;
    async fn enable(&self, subject_id: &str, secret: &str, code_hashes: &[Vec<u8>]) -> Result<()>;
    async fn disable(&self, subject_id: &str) -> Result<()>;
    /// Remove one backup code by hash. Atomic: concurrent consumers of the
    /// same code observe exactly one `true`.
    async fn consume_backup_code(&self, subject_id: &str, code_hash: &[u8]) -> Result<bool>;
    /// Replace the whole pool; returns `false` when MFA is not enabled.
    async fn replace_backup_codes(&self, subject_id: &str, code_hashes: &[Vec<u8>]) -> Result<bool>;
}

/// Staged enrollment material returned by `begin_enrollment`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Enrollment {
    /// Base32 shared secret, shown once for manual entry.
    pub secret: String,
    /// Standard `otpauth://` URI for QR rendering by the caller.
    pub provisioning_uri: String,
    /// Raw backup codes, shown once.
    pub backup_codes: Vec<String>,
}

/// Outcome of an MFA verification attempt.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MfaVerification {
    pub success: bool,
    pub message: String,
}

impl MfaVerification {
    fn failure(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
        }
    }

    fn success(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }
}

/// Second-factor enrollment and verification.
pub struct MfaService {
    store: Arc<dyn MfaStore>,
    audit: Arc<dyn AuditStore>,
    issuer: String,
}

impl MfaService {
    #[must_use]
    pub fn new(store: Arc<dyn MfaStore>, audit: Arc<dyn AuditStore>, issuer: String) -> Self {
        Self {
            store,
            audit,
            issuer,
        }
    }

    fn totp(&self, secret_base32: &str, account_name: &str) -> Result<TOTP> {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| anyhow!("invalid TOTP secret: {e}"))?;
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW_STEPS,
            TOTP_STEP_SECONDS,
            secret_bytes,
            Some(self.issuer.clone()),
            account_name.to_string(),
        )
        .map_err(|e| anyhow!("TOTP init error: {e}"))
    }

    /// Stage a fresh enrollment: secret, provisioning URI, and backup codes.
    /// Nothing is persisted until `confirm_enrollment`.
    ///
    /// # Errors
    /// Returns an error if secret generation fails.
    pub fn begin_enrollment(&self, subject_id: &str, label: &str) -> Result<Enrollment> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|e| anyhow!("secret generation error: {e}"))?;

        let totp = TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW_STEPS,
            TOTP_STEP_SECONDS,
            secret_bytes,
            Some(self.issuer.clone()),
            label.to_string(),
        )
        .map_err(|e| anyhow!("TOTP init error: {e}"))?;

        debug!(subject_id, "staged MFA enrollment");
        Ok(Enrollment {
            secret: totp.get_secret_base32(),
            provisioning_uri: totp.get_url(),
            backup_codes: generate_backup_codes(),
        })
    }

    /// Persist a staged enrollment as enabled.
    ///
    /// # Errors
    /// Returns an error if the secret or any backup code is malformed, or if
    /// the store write fails.
    pub async fn confirm_enrollment(
        &self,
        subject_id: &str,
        secret: &str,
        backup_codes: &[String],
        ip: Option<&str>,
        ua: Option<&str>,
    ) -> Result<()> {
        // Reject malformed material before any state is touched.
        Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|e| anyhow!("invalid TOTP secret: {e}"))?;
        let mut code_hashes = Vec::with_capacity(backup_codes.len());
        for code in backup_codes {
            code_hashes.push(hash_backup_code(&normalize_backup_code(code)?));
        }

        self.store.enable(subject_id, secret, &code_hashes).await?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new("mfa_enabled", "Multi-factor authentication enabled")
                .with_subject(subject_id)
                .with_ip_address(ip.map(str::to_string))
                .with_user_agent(ua.map(str::to_string)),
        )
        .await;
        Ok(())
    }

    /// Clear the secret and backup-code pool.
    ///
    /// # Errors
    /// Returns an error if the store write fails.
    pub async fn disable(
        &self,
        subject_id: &str,
        ip: Option<&str>,
        ua: Option<&str>,
    ) -> Result<()> {
        self.store.disable(subject_id).await?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new("mfa_disabled", "Multi-factor authentication disabled")
                .with_subject(subject_id)
                .with_severity(AuditSeverity::Warning)
                .with_ip_address(ip.map(str::to_string))
                .with_user_agent(ua.map(str::to_string)),
        )
        .await;
        Ok(())
    }

    /// Verify a 6-digit TOTP code or an 8-character backup code.
    ///
    /// The backup-code branch mutates state only on success; at most one of
    /// the two branches can succeed per call.
    ///
    /// # Errors
    /// Returns an error only for store failures; every protocol-level
    /// rejection is a descriptive `success: false` result.
    pub async fn verify(
        &self,
        subject_id: &str,
        presented: &str,
        ip: Option<&str>,
        ua: Option<&str>,
    ) -> Result<MfaVerification> {
        let Some(settings) = self.store.load(subject_id).await? else {
            return Ok(MfaVerification::failure("MFA not enabled for this user"));
        };
        if !settings.totp_enabled {
            return Ok(MfaVerification::failure("MFA not enabled for this user"));
        }
        let Some(secret) = settings.totp_secret.as_deref() else {
            return Ok(MfaVerification::failure("TOTP secret not configured"));
        };

        let totp = self.totp(secret, "user")?;
        if totp.check_current(presented).unwrap_or(false) {
            return Ok(MfaVerification::success("MFA verification successful"));
        }

        // Backup codes have a different shape (8 chars vs 6 digits); a code
        // that does not normalize simply cannot match the pool.
        if let Ok(normalized) = normalize_backup_code(presented) {
            let hash = hash_backup_code(&normalized);
            if self.store.consume_backup_code(subject_id, &hash).await? {
                let remaining = self.backup_codes_remaining(subject_id).await?;
                record_best_effort(
                    self.audit.as_ref(),
                    AuditEvent::new(
                        "mfa_backup_code_used",
                        format!("Backup code used ({remaining} remaining)"),
                    )
                    .with_subject(subject_id)
                    .with_ip_address(ip.map(str::to_string))
                    .with_user_agent(ua.map(str::to_string))
                    .with_metadata(serde_json::json!({ "remaining": remaining })),
                )
                .await;
                return Ok(MfaVerification::success(
                    "MFA verification successful (backup code)",
                ));
            }
        }

        warn!(subject_id, "failed MFA verification attempt");
        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new("mfa_verification_failed", "Failed MFA verification attempt")
                .with_subject(subject_id)
                .with_severity(AuditSeverity::Warning)
                .with_ip_address(ip.map(str::to_string))
                .with_user_agent(ua.map(str::to_string)),
        )
        .await;
        Ok(MfaVerification::failure("Invalid MFA token"))
    }

    /// Replace the backup-code pool; old codes become invalid immediately.
    ///
    /// # Errors
    /// Returns an error if MFA is not enabled or the store write fails.
    pub async fn regenerate_backup_codes(
        &self,
        subject_id: &str,
        ip: Option<&str>,
        ua: Option<&str>,
    ) -> Result<Vec<String>> {
        let codes = generate_backup_codes();
        let hashes: Vec<Vec<u8>> = codes
            .iter()
            .map(|code| hash_backup_code(code))
            .collect();

        if !self.store.replace_backup_codes(subject_id, &hashes).await? {
            return Err(anyhow!("MFA not enabled for this user"));
        }

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new("mfa_backup_codes_regenerated", "Backup codes regenerated")
                .with_subject(subject_id)
                .with_ip_address(ip.map(str::to_string))
                .with_user_agent(ua.map(str::to_string)),
        )
        .await;
        Ok(codes)
    }

    /// Number of unconsumed backup codes.
    ///
    /// # Errors
    /// Returns an error if the store read fails.
    pub async fn backup_codes_remaining(&self, subject_id: &str) -> Result<usize> {
        Ok(self
            .store
            .load(subject_id)
            .await?
            .map(|settings| settings.backup_code_hashes.len())
            .unwrap_or(0))
    }

    /// Whether the subject has a confirmed, enabled second factor.
    ///
    /// # Errors
    /// Returns an error if the store read fails.
    pub async fn is_enabled(&self, subject_id: &str) -> Result<bool> {
        Ok(self
            .store
            .load(subject_id)
            .await?
            .is_some_and(|settings| settings.totp_enabled))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{Enrollment, MemoryMfaStore, MfaService, TOTP_DIGITS, TOTP_STEP_SECONDS};
    use crate::audit::{AuditStore, MemoryAuditStore};
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};
    use totp_rs::{Algorithm, Secret, TOTP};

    fn service() -> (MfaService, Arc<MemoryAuditStore>) {
        let audit = Arc::new(MemoryAuditStore::new());
        let service = MfaService::new(
            Arc::new(MemoryMfaStore::new()),
            audit.clone(),
            "Wukong Console".to_string(),
        );
        (service, audit)
    }

    fn code_for(enrollment: &Enrollment, offset_seconds: i64) -> String {
        let secret = Secret::Encoded(enrollment.secret.clone()).to_bytes().unwrap();
        let totp = TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            2,
            TOTP_STEP_SECONDS,
            secret,
            Some("Wukong Console".to_string()),
            "user".to_string(),
        )
        .unwrap();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let time = now.checked_add_signed(offset_seconds).unwrap();
        totp.generate(time)
    }

    async fn enroll(service: &MfaService, subject: &str) -> Enrollment {
        let enrollment = service.begin_enrollment(subject, "alice@example.com").unwrap();
        service
            .confirm_enrollment(
                subject,
                &enrollment.secret,
                &enrollment.backup_codes,
                None,
                None,
            )
            .await
            .unwrap();
        enrollment
    }

    #[test]
    fn enrollment_material_shape() {
        let (service, _) = service();
        let enrollment = service.begin_enrollment("google:1", "alice@example.com").unwrap();
        assert!(enrollment.provisioning_uri.starts_with("otpauth://totp/"));
        assert!(enrollment.provisioning_uri.contains("Wukong%20Console"));
        assert_eq!(enrollment.backup_codes.len(), 10);
        assert!(!enrollment.secret.is_empty());
    }

    #[tokio::test]
    async fn current_code_verifies_after_enrollment() {
        let (service, _) = service();
        let enrollment = enroll(&service, "google:1").await;

        let result = service
            .verify("google:1", &code_for(&enrollment, 0), None, None)
            .await
            .unwrap();
        assert!(result.success, "{}", result.message);
    }

    #[tokio::test]
    async fn stale_code_rejected() {
        let (service, audit) = service();
        let enrollment = enroll(&service, "google:1").await;

        let result = service
            .verify("google:1", &code_for(&enrollment, -600), None, None)
            .await
            .unwrap();
        assert!(!result.success);

        let events = audit.list_for_subject("google:1").await.unwrap();
        assert!(
            events
                .iter()
                .any(|event| event.event_type == "mfa_verification_failed")
        );
    }

    #[tokio::test]
    async fn backup_code_single_use() {
        let (service, audit) = service();
        let enrollment = enroll(&service, "google:1").await;
        let code = enrollment.backup_codes[0].clone();

        assert_eq!(service.backup_codes_remaining("google:1").await.unwrap(), 10);

        let first = service.verify("google:1", &code, None, None).await.unwrap();
        assert!(first.success);
        assert!(first.message.contains("backup code"));
        assert_eq!(service.backup_codes_remaining("google:1").await.unwrap(), 9);

        let second = service.verify("google:1", &code, None, None).await.unwrap();
        assert!(!second.success);
        assert_eq!(service.backup_codes_remaining("google:1").await.unwrap(), 9);

        let events = audit.list_for_subject("google:1").await.unwrap();
        assert!(
            events
                .iter()
                .any(|event| event.event_type == "mfa_backup_code_used")
        );
    }

    #[tokio::test]
    async fn verify_without_enrollment_is_descriptive() {
        let (service, _) = service();
        let result = service.verify("google:9", "123456", None, None).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "MFA not enabled for this user");
    }

    #[tokio::test]
    async fn disable_clears_and_audits_warning() {
        let (service, audit) = service();
        let enrollment = enroll(&service, "google:1").await;
        service.disable("google:1", None, None).await.unwrap();

        assert!(!service.is_enabled("google:1").await.unwrap());
        let result = service
            .verify("google:1", &code_for(&enrollment, 0), None, None)
            .await
            .unwrap();
        assert!(!result.success);

        let events = audit.list_for_subject("google:1").await.unwrap();
        let disabled = events
            .iter()
            .find(|event| event.event_type == "mfa_disabled")
            .unwrap();
        assert_eq!(disabled.severity, crate::audit::AuditSeverity::Warning);
    }

    #[tokio::test]
    async fn regenerate_invalidates_old_pool() {
        let (service, _) = service();
        let enrollment = enroll(&service, "google:1").await;
        let old_code = enrollment.backup_codes[0].clone();

        let new_codes = service
            .regenerate_backup_codes("google:1", None, None)
            .await
            .unwrap();
        assert_eq!(new_codes.len(), 10);

        let old = service.verify("google:1", &old_code, None, None).await.unwrap();
        assert!(!old.success);
        let new = service
            .verify("google:1", &new_codes[0], None, None)
            .await
            .unwrap();
        assert!(new.success);
    }

    #[tokio::test]
    async fn regenerate_requires_enrollment() {
        let (service, _) = service();
        assert!(
            service
                .regenerate_backup_codes("google:9", None, None)
                .await
                .is_err()
        );
    }
}

//! Backup-code generation and verification helpers.
//!
//! Backup codes are the single-use fallback for when the authenticator
//! device is unavailable. Only SHA-256 hashes are persisted; the raw codes
//! are shown once at generation time.

use anyhow::Result;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

pub(crate) const BACKUP_CODE_COUNT: usize = 10;
pub(crate) const BACKUP_CODE_LEN: usize = 8;
// Uppercase alphanumerics minus the confusable I/O/0/1.
const BACKUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate a fresh batch of backup codes.
#[must_use]
pub fn generate_backup_codes() -> Vec<String> {
    (0..BACKUP_CODE_COUNT).map(|_| generate_code()).collect()
}

/// Normalize a presented backup code for hashing.
///
/// # Errors
/// Returns an error for codes of the wrong length or outside the alphabet.
pub fn normalize_backup_code(input: &str) -> Result<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != BACKUP_CODE_LEN {
        return Err(anyhow::anyhow!("invalid backup code length"));
    }

    if !normalized
        .as_bytes()
        .iter()
        .all(|ch| BACKUP_CODE_ALPHABET.contains(ch))
    {
        return Err(anyhow::anyhow!("invalid backup code characters"));
    }

    Ok(normalized)
}

/// Hash a normalized backup code for storage and comparison.
#[must_use]
pub fn hash_backup_code(normalized: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.finalize().to_vec()
}

fn generate_code() -> String {
    let mut raw = [0u8; BACKUP_CODE_LEN];
    OsRng.fill_bytes(&mut raw);
    raw.iter()
        .map(|byte| {
            let idx = usize::from(*byte) % BACKUP_CODE_ALPHABET.len();
            BACKUP_CODE_ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{
        BACKUP_CODE_COUNT, BACKUP_CODE_LEN, generate_backup_codes, hash_backup_code,
        normalize_backup_code,
    };

    #[test]
    fn generates_full_batch_of_valid_codes() {
        let codes = generate_backup_codes();
        assert_eq!(codes.len(), BACKUP_CODE_COUNT);
        for code in &codes {
            assert_eq!(code.len(), BACKUP_CODE_LEN);
            assert_eq!(normalize_backup_code(code).unwrap(), *code);
        }
    }

    #[test]
    fn normalize_uppercases_and_strips() {
        assert_eq!(normalize_backup_code("abcd efgh").unwrap(), "ABCDEFGH");
        assert_eq!(normalize_backup_code("ab-cd-ef-gh").unwrap(), "ABCDEFGH");
    }

    #[test]
    fn normalize_rejects_wrong_length_and_alphabet() {
        assert!(normalize_backup_code("SHORT").is_err());
        assert!(normalize_backup_code("ABCDEFGHI").is_err());
        // 0 and 1 are not in the alphabet.
        assert!(normalize_backup_code("ABCD0EFG").is_err());
        assert!(normalize_backup_code("1BCDEFGH").is_err());
    }

    #[test]
    fn hash_is_stable_and_distinct() {
        let first = hash_backup_code("ABCDEFGH");
        let second = hash_backup_code("ABCDEFGH");
        let other = hash_backup_code("ABCDEFGJ");
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.len(), 32);
    }
}

//! # Wukong IdP (Identity Provider for the Wukong VM Console)
//!
//! `wukong-idp` is the self-hosted identity provider embedded in the Wukong
//! VM-management console. It issues and redeems single-use authorization
//! codes, exchanges them for access tokens and signed ID assertions, mints
//! and verifies the stateless session credential carried by the console's
//! cookie, and layers TOTP-based multi-factor authentication and per-device
//! session tracking on top.
//!
//! ## Credential Model
//!
//! - **Authorization codes** are short-lived, single-use, and bound to the
//!   `(client_id, redirect_uri, subject)` triple they were minted for.
//!   Redemption is atomic: exactly one concurrent redeemer succeeds.
//! - **Access tokens** are opaque bearer capabilities stored server-side;
//!   they only grant the user-info lookup.
//! - **Session credentials** are self-contained HS256 assertions verified
//!   statelessly on every request. Real-time revocation is layered on top
//!   via device sessions: the credential names a device session whose
//!   liveness is checked after the signature.
//!
//! ## Identity Model
//!
//! Identities live in the console's user store and are keyed by a stable
//! external id (`{provider}:{provider_user_id}`). This crate only reads and
//! upserts them; it never owns their lifecycle.
//!
//! ## Failure Posture
//!
//! Protocol violations (unknown/used/expired codes, mismatched bindings,
//! invalid grant types) are recoverable caller errors, never fatal.
//! Signature failures mean "unauthenticated", never a crash. If a backing
//! store is unreachable, authentication fails closed. Security-relevant
//! outcomes produce audit events; audit writes are best-effort and never
//! fail the primary operation.

pub mod api;
pub mod audit;
pub mod cli;
pub mod identity;
pub mod oauth;
pub mod session;
pub mod token;
pub mod totp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

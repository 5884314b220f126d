//! Authenticated principal extraction.
//!
//! The credential is verified statelessly first (signature + expiry), then
//! the device session it names is checked for liveness, and finally the
//! subject is resolved against the identity store. Any failure, including a
//! store error, yields 401: authentication fails closed.

use axum::http::{HeaderMap, StatusCode};
use tracing::{error, warn};

use super::{state::AuthState, utils::extract_session_credential};
use crate::identity::Role;

/// Authenticated user context derived from the session credential.
#[derive(Clone, Debug)]
pub struct Principal {
    pub subject_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub role: Role,
    /// Opaque device-session identifier carried by the credential.
    pub device_session: Option<String>,
}

/// Resolve the session credential into a principal, or 401.
pub async fn require_auth(headers: &HeaderMap, state: &AuthState) -> Result<Principal, StatusCode> {
    let Some(credential) = extract_session_credential(headers, state.config().cookie_name())
    else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    let Some(claims) = state.signer().verify_session(&credential) else {
        warn!("session credential failed verification");
        return Err(StatusCode::UNAUTHORIZED);
    };

    // Revocation check: a cryptographically valid credential whose device
    // session was revoked or expired no longer authenticates.
    if let Some(sid) = claims.sid.as_deref() {
        match state.sessions().is_live(sid).await {
            Ok(true) => {
                if let Err(err) = state.sessions().touch(sid).await {
                    error!("failed to record session activity: {err}");
                }
            }
            Ok(false) => return Err(StatusCode::UNAUTHORIZED),
            Err(err) => {
                error!("failed to check session liveness: {err}");
                return Err(StatusCode::UNAUTHORIZED);
            }
        }
    }

    let identity = match state.identities().find_by_external_id(&claims.sub).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return Err(StatusCode::UNAUTHORIZED),
        Err(err) => {
            error!("failed to resolve identity: {err}");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    Ok(Principal {
        subject_id: identity.external_id.clone(),
        display_name: identity.display_label(),
        email: identity.email.clone(),
        role: identity.role,
        device_session: claims.sid,
    })
}

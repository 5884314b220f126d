//! Session endpoints for cookie and bearer auth.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;

use super::{
    principal::require_auth,
    state::{AuthConfig, AuthState},
    types::SessionResponse,
    utils::extract_session_credential,
};

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // Missing or invalid credentials are all "no session" to avoid leaking
    // auth state to probes.
    match require_auth(&headers, &auth_state).await {
        Ok(principal) => (
            StatusCode::OK,
            Json(SessionResponse {
                subject_id: principal.subject_id,
                display_name: principal.display_name,
                email: principal.email,
                role: principal.role,
            }),
        )
            .into_response(),
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // Revoke the device session named by the credential, if any. The
    // credential itself stays cryptographically valid until expiry, which is
    // exactly why the liveness check exists.
    if let Some(credential) = extract_session_credential(&headers, auth_state.config().cookie_name())
        && let Some(claims) = auth_state.signer().verify_session(&credential)
        && let Some(sid) = claims.sid.as_deref()
        && let Err(err) = auth_state.sessions().revoke_by_token(sid).await
    {
        error!("failed to revoke device session on logout: {err}");
    }

    // Always clear the cookie, even if no device session was found.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Build the `HttpOnly` cookie carrying the session credential.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    credential: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.cookie_name();
    let ttl_seconds = config.session_ttl_seconds();
    let mut cookie =
        format!("{name}={credential}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.cookie_name();
    let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

//! Device-session endpoints: list, targeted revoke, revoke everywhere.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::{principal::require_auth, state::AuthState};
use crate::{
    identity::Role,
    session::{DeviceSession, RevokeError},
};

#[utoipa::path(
    get,
    path = "/v1/auth/sessions",
    responses(
        (status = 200, description = "All sessions for the subject, active or revoked", body = Vec<DeviceSession>),
        (status = 401, description = "Unauthorized")
    ),
    tag = "sessions"
)]
pub async fn list_sessions(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> axum::response::Response {
    let principal = match require_auth(&headers, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match auth_state.sessions().list(&principal.subject_id).await {
        Ok(sessions) => (StatusCode::OK, Json(sessions)).into_response(),
        Err(err) => {
            error!("failed to list device sessions: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/sessions/{id}/revoke",
    params(
        ("id" = Uuid, Path, description = "Device session id")
    ),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 403, description = "Session belongs to another subject"),
        (status = 404, description = "Unknown session"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "sessions"
)]
pub async fn revoke_session(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    let principal = match require_auth(&headers, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let admin_override = principal.role == Role::Admin;
    match auth_state
        .sessions()
        .revoke(id, &principal.subject_id, admin_override)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(RevokeError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(RevokeError::Forbidden) => StatusCode::FORBIDDEN.into_response(),
        Err(RevokeError::Storage(err)) => {
            error!("failed to revoke device session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/sessions/revoke-all",
    responses(
        (status = 204, description = "Every session for the subject revoked"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "sessions"
)]
pub async fn revoke_all_sessions(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> axum::response::Response {
    let principal = match require_auth(&headers, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match auth_state.sessions().revoke_all(&principal.subject_id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("failed to revoke all device sessions: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

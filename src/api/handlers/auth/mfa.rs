//! MFA endpoints for the authenticated principal.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;

use super::{
    principal::require_auth,
    state::AuthState,
    types::{BackupCodesResponse, MfaEnrollFinishRequest, MfaStatusResponse, MfaVerifyRequest},
    utils::{extract_client_ip, extract_user_agent},
};
use crate::totp::{Enrollment, MfaVerification};

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/enroll/start",
    responses(
        (status = 200, description = "Enrollment staged", body = Enrollment),
        (status = 401, description = "Unauthorized")
    ),
    tag = "mfa"
)]
pub async fn enroll_start(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> axum::response::Response {
    let principal = match require_auth(&headers, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let label = principal
        .email
        .clone()
        .unwrap_or_else(|| principal.display_name.clone());

    match auth_state.mfa().begin_enrollment(&principal.subject_id, &label) {
        Ok(enrollment) => (StatusCode::OK, Json(enrollment)).into_response(),
        Err(err) => {
            error!("failed to stage MFA enrollment: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/enroll/finish",
    request_body = MfaEnrollFinishRequest,
    responses(
        (status = 204, description = "MFA enabled"),
        (status = 400, description = "Malformed enrollment material"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "mfa"
)]
pub async fn enroll_finish(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<MfaEnrollFinishRequest>>,
) -> axum::response::Response {
    let principal = match require_auth(&headers, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };
    if request.secret.trim().is_empty() || request.backup_codes.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing enrollment material").into_response();
    }

    let ip = extract_client_ip(&headers);
    let ua = extract_user_agent(&headers);
    match auth_state
        .mfa()
        .confirm_enrollment(
            &principal.subject_id,
            request.secret.trim(),
            &request.backup_codes,
            ip.as_deref(),
            ua.as_deref(),
        )
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            // Malformed secrets/codes are caller errors; the store path logs itself.
            error!("failed to confirm MFA enrollment: {err}");
            (StatusCode::BAD_REQUEST, "Invalid enrollment material").into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/verify",
    request_body = MfaVerifyRequest,
    responses(
        (status = 200, description = "Verification outcome", body = MfaVerification),
        (status = 400, description = "Missing payload"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "mfa"
)]
pub async fn verify(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<MfaVerifyRequest>>,
) -> axum::response::Response {
    let principal = match require_auth(&headers, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let ip = extract_client_ip(&headers);
    let ua = extract_user_agent(&headers);
    match auth_state
        .mfa()
        .verify(
            &principal.subject_id,
            request.code.trim(),
            ip.as_deref(),
            ua.as_deref(),
        )
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => {
            error!("MFA verification failed on storage: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/disable",
    responses(
        (status = 204, description = "MFA disabled"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "mfa"
)]
pub async fn disable(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> axum::response::Response {
    let principal = match require_auth(&headers, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let ip = extract_client_ip(&headers);
    let ua = extract_user_agent(&headers);
    match auth_state
        .mfa()
        .disable(&principal.subject_id, ip.as_deref(), ua.as_deref())
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("failed to disable MFA: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/backup-codes/regenerate",
    responses(
        (status = 200, description = "New backup codes", body = BackupCodesResponse),
        (status = 400, description = "MFA not enabled"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "mfa"
)]
pub async fn regenerate_backup_codes(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> axum::response::Response {
    let principal = match require_auth(&headers, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let ip = extract_client_ip(&headers);
    let ua = extract_user_agent(&headers);
    match auth_state
        .mfa()
        .regenerate_backup_codes(&principal.subject_id, ip.as_deref(), ua.as_deref())
        .await
    {
        Ok(backup_codes) => (
            StatusCode::OK,
            Json(BackupCodesResponse { backup_codes }),
        )
            .into_response(),
        Err(err) => {
            error!("failed to regenerate backup codes: {err}");
            (StatusCode::BAD_REQUEST, "MFA not enabled").into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/mfa/status",
    responses(
        (status = 200, description = "MFA status", body = MfaStatusResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "mfa"
)]
pub async fn status(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> axum::response::Response {
    let principal = match require_auth(&headers, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let enabled = auth_state.mfa().is_enabled(&principal.subject_id).await;
    let remaining = auth_state
        .mfa()
        .backup_codes_remaining(&principal.subject_id)
        .await;
    match (enabled, remaining) {
        (Ok(enabled), Ok(backup_codes_remaining)) => (
            StatusCode::OK,
            Json(MfaStatusResponse {
                enabled,
                backup_codes_remaining,
            }),
        )
            .into_response(),
        (Err(err), _) | (_, Err(err)) => {
            error!("failed to load MFA status: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

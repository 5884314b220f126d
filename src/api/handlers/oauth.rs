//! OAuth endpoints: authorize portal contract, provider authentication,
//! token exchange, user info, and the first-party callback.
//!
//! Two sign-in paths deliberately coexist, matching the console's behavior:
//! the email path is first-party trusted and sets the session cookie
//! directly from the authenticate endpoint, while provider logins round-trip
//! through the authorization-code exchange.

use axum::{
    Json,
    extract::rejection::QueryRejection,
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Redirect},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::{IntoParams, ToSchema};

use super::auth::{
    AuthState, session,
    utils::{extract_client_ip, extract_user_agent, normalize_email, valid_email},
};
use crate::{
    identity::{Identity, IdentityProfile, external_id},
    oauth::{
        CodeRedeemError, ExchangeError, ExchangeRequest, GRANT_TYPE_AUTHORIZATION_CODE, TokenGrant,
    },
    session::DeviceMeta,
};

/// Providers the portal can offer. The provider-specific redirect dance is
/// the caller's concern; this core receives its outcome.
const PROVIDERS: [&str; 4] = ["google", "microsoft", "apple", "email"];

/// Opaque `state` payload: URL-safe base64 (no padding) of this JSON object.
/// Exactly one encoding is accepted; anything else is rejected.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateParam {
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

pub(crate) fn decode_state(state: &str) -> Result<StateParam, String> {
    let trimmed = state.trim();
    if trimmed.is_empty() {
        return Err("Missing state parameter".to_string());
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|_| "Invalid state encoding".to_string())?;
    serde_json::from_slice(&bytes).map_err(|_| "Invalid state payload".to_string())
}

/// Encode a `state` payload the way the portal expects it.
#[must_use]
pub fn encode_state(state: &StateParam) -> String {
    // Serialization of this shape cannot fail.
    let json = serde_json::to_vec(state).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

#[derive(IntoParams, Debug, Deserialize)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeParams {
    client_id: String,
    redirect_uri: String,
    state: String,
}

/// Portal descriptor returned to the UI layer, which renders the login page.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizePortal {
    pub client_id: String,
    pub redirect_uri: String,
    pub state: String,
    pub providers: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/v1/oauth/authorize",
    params(AuthorizeParams),
    responses(
        (status = 200, description = "Portal descriptor for the login page", body = AuthorizePortal),
        (status = 400, description = "Missing parameters or undecodable state"),
        (status = 403, description = "Unknown client id")
    ),
    tag = "oauth"
)]
pub async fn authorize(
    auth_state: Extension<Arc<AuthState>>,
    query: Result<Query<AuthorizeParams>, QueryRejection>,
) -> axum::response::Response {
    let Ok(Query(params)) = query else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "clientId, redirectUri, and state are required",
        );
    };

    if params.client_id != auth_state.config().client_id() {
        warn!(client_id = %params.client_id, "authorize request with unknown client id");
        return error_response(StatusCode::FORBIDDEN, "invalid client id");
    }
    if let Err(message) = decode_state(&params.state) {
        return error_response(StatusCode::BAD_REQUEST, &message);
    }

    (
        StatusCode::OK,
        Json(AuthorizePortal {
            client_id: params.client_id,
            redirect_uri: params.redirect_uri,
            state: params.state,
            providers: PROVIDERS.iter().map(ToString::to_string).collect(),
        }),
    )
        .into_response()
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateRequest {
    pub provider: String,
    #[serde(default)]
    pub provider_user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    pub client_id: String,
    pub redirect_uri: String,
    pub state: String,
}

/// Code-flow response for provider logins.
#[derive(Debug, Serialize, ToSchema)]
pub struct CodeResponse {
    pub code: String,
}

/// Direct-login response for the first-party email path.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DirectLoginResponse {
    pub success: bool,
    pub redirect_url: String,
}

#[utoipa::path(
    post,
    path = "/v1/oauth/authenticate",
    request_body = AuthenticateRequest,
    responses(
        (status = 200, description = "Authorization code, or direct-login outcome for the email provider"),
        (status = 400, description = "Missing or malformed fields"),
        (status = 403, description = "Unknown client id")
    ),
    tag = "oauth"
)]
pub async fn authenticate(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<AuthenticateRequest>>,
) -> axum::response::Response {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing payload");
    };
    if request.provider.trim().is_empty()
        || request.client_id.trim().is_empty()
        || request.redirect_uri.trim().is_empty()
        || request.state.trim().is_empty()
    {
        return error_response(
            StatusCode::BAD_REQUEST,
            "provider, clientId, redirectUri, and state are required",
        );
    }
    if request.client_id != auth_state.config().client_id() {
        warn!(client_id = %request.client_id, "authenticate request with unknown client id");
        return error_response(StatusCode::FORBIDDEN, "invalid client id");
    }
    if let Err(message) = decode_state(&request.state) {
        return error_response(StatusCode::BAD_REQUEST, &message);
    }

    if request.provider == "email" {
        return authenticate_email(&headers, &auth_state, &request).await;
    }

    // Provider hand-off: the upstream dance already happened; we receive the
    // stable provider user id and profile.
    let Some(provider_user_id) = request
        .provider_user_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return error_response(StatusCode::BAD_REQUEST, "providerUserId is required");
    };

    let subject = external_id(&request.provider, provider_user_id);
    let profile = IdentityProfile {
        display_name: request.display_name.clone(),
        email: request.email.clone(),
        login_method: Some(request.provider.clone()),
    };
    if let Err(err) = auth_state.identities().upsert(&subject, profile).await {
        error!("failed to upsert identity: {err}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "authentication failed");
    }

    let code = auth_state
        .oauth()
        .issue_code(&request.client_id, &request.redirect_uri, &subject)
        .await;
    (StatusCode::OK, Json(CodeResponse { code })).into_response()
}

/// The trusted first-party path: no code exchange, the session cookie is set
/// directly and the caller is sent back to the console root.
async fn authenticate_email(
    headers: &HeaderMap,
    auth_state: &AuthState,
    request: &AuthenticateRequest,
) -> axum::response::Response {
    let Some(email) = request.email.as_deref() else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "email is required for email authentication",
        );
    };
    let email = normalize_email(email);
    if !valid_email(&email) {
        return error_response(StatusCode::BAD_REQUEST, "invalid email format");
    }

    let subject = external_id("email", &email);
    let display_name = request.display_name.clone().or_else(|| {
        email
            .split('@')
            .next()
            .map(str::to_string)
            .filter(|local| !local.is_empty())
    });
    let profile = IdentityProfile {
        display_name,
        email: Some(email.clone()),
        login_method: Some("email".to_string()),
    };
    let identity = match auth_state.identities().upsert(&subject, profile).await {
        Ok(identity) => identity,
        Err(err) => {
            error!("failed to upsert identity: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "authentication failed");
        }
    };

    match complete_login(auth_state, headers, &identity).await {
        Ok(response_headers) => (
            StatusCode::OK,
            response_headers,
            Json(DirectLoginResponse {
                success: true,
                redirect_url: "/".to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!("failed to establish session: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "authentication failed")
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/oauth/token",
    request_body = ExchangeRequest,
    responses(
        (status = 200, description = "Access token, ID assertion, and expiry", body = TokenGrant),
        (status = 400, description = "Protocol violation; restart sign-in"),
        (status = 403, description = "Unknown client id")
    ),
    tag = "oauth"
)]
pub async fn token(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ExchangeRequest>>,
) -> axum::response::Response {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing payload");
    };
    if request.code.trim().is_empty()
        || request.client_id.trim().is_empty()
        || request.redirect_uri.trim().is_empty()
    {
        return error_response(
            StatusCode::BAD_REQUEST,
            "code, clientId, and redirectUri are required",
        );
    }
    if request.client_id != auth_state.config().client_id() {
        warn!(client_id = %request.client_id, "token request with unknown client id");
        return error_response(StatusCode::FORBIDDEN, "invalid client id");
    }

    match auth_state.oauth().exchange(&request).await {
        Ok(grant) => (StatusCode::OK, Json(grant)).into_response(),
        Err(err) => {
            warn!("token exchange rejected: {err}");
            let (status, message) = exchange_error_response(&err);
            error_response(status, message)
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoRequest {
    pub access_token: String,
}

/// Profile fields exposed for a valid access token.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoResponse {
    pub external_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub login_method: Option<String>,
    pub role: crate::identity::Role,
}

impl From<Identity> for UserInfoResponse {
    fn from(identity: Identity) -> Self {
        Self {
            display_name: identity.display_label(),
            external_id: identity.external_id,
            email: identity.email,
            login_method: identity.login_method,
            role: identity.role,
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/oauth/userinfo",
    request_body = UserInfoRequest,
    responses(
        (status = 200, description = "Subject profile", body = UserInfoResponse),
        (status = 400, description = "Missing access token"),
        (status = 401, description = "Invalid or expired access token")
    ),
    tag = "oauth"
)]
pub async fn userinfo(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UserInfoRequest>>,
) -> axum::response::Response {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing payload");
    };
    if request.access_token.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "accessToken is required");
    }

    match auth_state.oauth().user_info(&request.access_token).await {
        Ok(identity) => (StatusCode::OK, Json(UserInfoResponse::from(identity))).into_response(),
        Err(err) => {
            warn!("user info rejected: {err}");
            let (status, message) = exchange_error_response(&err);
            error_response(status, message)
        }
    }
}

#[derive(IntoParams, Debug, Deserialize)]
#[into_params(parameter_in = Query)]
pub struct CallbackParams {
    code: String,
    state: String,
}

#[utoipa::path(
    get,
    path = "/oauth/callback",
    params(CallbackParams),
    responses(
        (status = 303, description = "Session established; redirect to the console"),
        (status = 400, description = "Exchange failed; restart sign-in")
    ),
    tag = "oauth"
)]
pub async fn callback(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> axum::response::Response {
    let Ok(Query(params)) = query else {
        return error_response(StatusCode::BAD_REQUEST, "code and state are required");
    };
    let state = match decode_state(&params.state) {
        Ok(state) => state,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };

    let request = ExchangeRequest {
        grant_type: GRANT_TYPE_AUTHORIZATION_CODE.to_string(),
        code: params.code,
        client_id: auth_state.config().client_id().to_string(),
        redirect_uri: state.redirect_uri,
    };
    let grant = match auth_state.oauth().exchange(&request).await {
        Ok(grant) => grant,
        Err(err) => {
            warn!("callback exchange rejected: {err}");
            return error_response(StatusCode::BAD_REQUEST, "sign-in could not be completed");
        }
    };

    // The ID assertion closes the loop: it must verify under our own key and
    // name the client we exchanged for.
    let claims = match auth_state
        .signer()
        .verify_id_token(&grant.id_token, auth_state.config().client_id())
    {
        Ok(claims) => claims,
        Err(err) => {
            warn!("callback ID assertion rejected: {err}");
            return error_response(StatusCode::BAD_REQUEST, "sign-in could not be completed");
        }
    };

    let identity = match auth_state.identities().find_by_external_id(&claims.sub).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            warn!(subject = %claims.sub, "callback for unknown subject");
            return error_response(StatusCode::BAD_REQUEST, "sign-in could not be completed");
        }
        Err(err) => {
            error!("failed to resolve identity: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "sign-in could not be completed");
        }
    };

    match complete_login(&auth_state, &headers, &identity).await {
        Ok(response_headers) => (response_headers, Redirect::to("/")).into_response(),
        Err(err) => {
            error!("failed to establish session: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "sign-in could not be completed")
        }
    }
}

/// Record a device session, mint the session credential naming it, and build
/// the `Set-Cookie` header.
async fn complete_login(
    auth_state: &AuthState,
    headers: &HeaderMap,
    identity: &Identity,
) -> anyhow::Result<HeaderMap> {
    let meta = DeviceMeta {
        device_name: None,
        user_agent: extract_user_agent(headers),
        ip_address: extract_client_ip(headers),
    };
    let device_token = auth_state
        .sessions()
        .create(&identity.external_id, meta)
        .await?;

    let credential = auth_state.signer().mint_session(
        &identity.external_id,
        auth_state.config().client_id(),
        &identity.display_label(),
        Some(&device_token),
        Duration::seconds(auth_state.config().session_ttl_seconds()),
    )?;

    let cookie = session::session_cookie(auth_state.config(), &credential)?;
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);
    Ok(response_headers)
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Map exchange failures to responses. Unknown and expired codes share one
/// opaque message so probing cannot distinguish them.
fn exchange_error_response(err: &ExchangeError) -> (StatusCode, &'static str) {
    match err {
        ExchangeError::UnsupportedGrantType(_) => (
            StatusCode::BAD_REQUEST,
            "unsupported grant type; only 'authorization_code' is supported",
        ),
        ExchangeError::Code(CodeRedeemError::NotFound | CodeRedeemError::Expired) => {
            (StatusCode::BAD_REQUEST, "invalid authorization code")
        }
        ExchangeError::Code(CodeRedeemError::AlreadyUsed) => (
            StatusCode::BAD_REQUEST,
            "authorization code has already been used",
        ),
        ExchangeError::Code(CodeRedeemError::ClientMismatch) => {
            (StatusCode::BAD_REQUEST, "client id mismatch")
        }
        ExchangeError::Code(CodeRedeemError::RedirectMismatch) => {
            (StatusCode::BAD_REQUEST, "redirect URI mismatch")
        }
        ExchangeError::Token(_) | ExchangeError::UnknownSubject => {
            (StatusCode::UNAUTHORIZED, "invalid access token")
        }
        ExchangeError::Signing(_) | ExchangeError::Storage(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

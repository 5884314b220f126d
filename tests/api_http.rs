//! HTTP-level tests over the router with in-memory stores.

use axum::{
    Extension, Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use secrecy::SecretString;
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower::ServiceExt;
use wukong_idp::{
    api::{AuthConfig, AuthState, handlers::oauth::{StateParam, encode_state}},
    audit::MemoryAuditStore,
    identity::MemoryIdentityStore,
    session::MemoryDeviceSessionStore,
    totp::MemoryMfaStore,
};

const CLIENT_ID: &str = "wukong-console";
const REDIRECT_URI: &str = "https://console.wukong.dev/oauth/callback";

fn app() -> Router {
    let config = AuthConfig::new(
        "https://console.wukong.dev".to_string(),
        CLIENT_ID.to_string(),
        SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
    )
    .with_session_ttl_seconds(3600);
    let auth_state = Arc::new(AuthState::new(
        config,
        Arc::new(MemoryIdentityStore::new()),
        Arc::new(MemoryMfaStore::new()),
        Arc::new(MemoryDeviceSessionStore::new()),
        Arc::new(MemoryAuditStore::new()),
    ));
    // Lazy pool: only the health probes touch it, and they are not under test here.
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://wukong@localhost:5432/wukong")
        .expect("lazy pool");

    let (router, _openapi) = wukong_idp::api::router().split_for_parts();
    router.layer(Extension(auth_state)).layer(Extension(pool))
}

fn state_param() -> String {
    encode_state(&StateParam {
        redirect_uri: REDIRECT_URI.to_string(),
        nonce: None,
    })
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn with_cookie(mut request: Request<Body>, cookie: &str) -> Request<Body> {
    request.headers_mut().insert(
        header::COOKIE,
        cookie.parse().expect("cookie header"),
    );
    request
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn session_cookie_pair(response: &axum::response::Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("set-cookie header")
        .to_str()
        .expect("cookie str");
    set_cookie
        .split(';')
        .next()
        .expect("cookie pair")
        .to_string()
}

fn authenticate_body(provider: &str) -> Value {
    json!({
        "provider": provider,
        "providerUserId": "42",
        "displayName": "Alice",
        "email": "alice@example.com",
        "clientId": CLIENT_ID,
        "redirectUri": REDIRECT_URI,
        "state": state_param(),
    })
}

#[tokio::test]
async fn provider_login_round_trips_through_code_exchange() {
    let app = app();

    // Provider hand-off mints a code.
    let response = app
        .clone()
        .oneshot(post_json("/v1/oauth/authenticate", &authenticate_body("google")))
        .await
        .expect("authenticate");
    assert_eq!(response.status(), StatusCode::OK);
    let code = body_json(response).await["code"]
        .as_str()
        .expect("code")
        .to_string();

    // Exchange it for tokens.
    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/oauth/token",
            &json!({
                "grantType": "authorization_code",
                "code": code,
                "clientId": CLIENT_ID,
                "redirectUri": REDIRECT_URI,
            }),
        ))
        .await
        .expect("token");
    assert_eq!(response.status(), StatusCode::OK);
    let grant = body_json(response).await;
    assert_eq!(grant["tokenType"], "Bearer");
    assert_eq!(grant["scope"], "openid profile email");
    let access_token = grant["accessToken"].as_str().expect("access token");

    // Replay is rejected.
    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/oauth/token",
            &json!({
                "grantType": "authorization_code",
                "code": code,
                "clientId": CLIENT_ID,
                "redirectUri": REDIRECT_URI,
            }),
        ))
        .await
        .expect("token replay");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The access token resolves the profile.
    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/oauth/userinfo",
            &json!({ "accessToken": access_token }),
        ))
        .await
        .expect("userinfo");
    assert_eq!(response.status(), StatusCode::OK);
    let profile = body_json(response).await;
    assert_eq!(profile["externalId"], "google:42");
    assert_eq!(profile["displayName"], "Alice");

    // A fresh code drives the browser callback into a session cookie.
    let response = app
        .clone()
        .oneshot(post_json("/v1/oauth/authenticate", &authenticate_body("google")))
        .await
        .expect("authenticate again");
    let code = body_json(response).await["code"]
        .as_str()
        .expect("code")
        .to_string();

    let response = app
        .clone()
        .oneshot(get(&format!(
            "/oauth/callback?code={code}&state={}",
            state_param()
        )))
        .await
        .expect("callback");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cookie = session_cookie_pair(&response);

    let response = app
        .clone()
        .oneshot(with_cookie(get("/v1/auth/session"), &cookie))
        .await
        .expect("session");
    assert_eq!(response.status(), StatusCode::OK);
    let session = body_json(response).await;
    assert_eq!(session["subject_id"], "google:42");
    assert_eq!(session["display_name"], "Alice");

    // Logout revokes the device session; the still-signed credential no
    // longer authenticates.
    let response = app
        .clone()
        .oneshot(with_cookie(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/logout")
                .body(Body::empty())
                .expect("request"),
            &cookie,
        ))
        .await
        .expect("logout");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(with_cookie(get("/v1/auth/session"), &cookie))
        .await
        .expect("session after logout");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn email_login_sets_cookie_directly() {
    let app = app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/oauth/authenticate",
            &json!({
                "provider": "email",
                "email": "Bob@Example.com",
                "clientId": CLIENT_ID,
                "redirectUri": REDIRECT_URI,
                "state": state_param(),
            }),
        ))
        .await
        .expect("authenticate");
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie_pair(&response);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["redirectUrl"], "/");

    let response = app
        .clone()
        .oneshot(with_cookie(get("/v1/auth/session"), &cookie))
        .await
        .expect("session");
    assert_eq!(response.status(), StatusCode::OK);
    let session = body_json(response).await;
    assert_eq!(session["subject_id"], "email:bob@example.com");
    assert_eq!(session["display_name"], "bob");

    // Device-session bookkeeping: one listed session, revoke-all kills it.
    let response = app
        .clone()
        .oneshot(with_cookie(get("/v1/auth/sessions"), &cookie))
        .await
        .expect("sessions");
    assert_eq!(response.status(), StatusCode::OK);
    let sessions = body_json(response).await;
    assert_eq!(sessions.as_array().expect("array").len(), 1);

    let response = app
        .clone()
        .oneshot(with_cookie(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/sessions/revoke-all")
                .body(Body::empty())
                .expect("request"),
            &cookie,
        ))
        .await
        .expect("revoke all");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(with_cookie(get("/v1/auth/session"), &cookie))
        .await
        .expect("session after revoke-all");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn input_validation_and_client_checks() {
    let app = app();

    // Unknown client id on the authorize portal.
    let response = app
        .clone()
        .oneshot(get(&format!(
            "/v1/oauth/authorize?clientId=other&redirectUri={REDIRECT_URI}&state={}",
            state_param()
        )))
        .await
        .expect("authorize");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Undecodable state: exactly one canonical encoding is accepted.
    let response = app
        .clone()
        .oneshot(get(&format!(
            "/v1/oauth/authorize?clientId={CLIENT_ID}&redirectUri={REDIRECT_URI}&state=not-base64!"
        )))
        .await
        .expect("authorize bad state");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Valid request returns the portal descriptor.
    let response = app
        .clone()
        .oneshot(get(&format!(
            "/v1/oauth/authorize?clientId={CLIENT_ID}&redirectUri={REDIRECT_URI}&state={}",
            state_param()
        )))
        .await
        .expect("authorize ok");
    assert_eq!(response.status(), StatusCode::OK);
    let portal = body_json(response).await;
    assert!(
        portal["providers"]
            .as_array()
            .expect("providers")
            .iter()
            .any(|p| p == "email")
    );

    // Only authorization_code is supported.
    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/oauth/token",
            &json!({
                "grantType": "client_credentials",
                "code": "whatever",
                "clientId": CLIENT_ID,
                "redirectUri": REDIRECT_URI,
            }),
        ))
        .await
        .expect("token");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown code and expired code share one opaque rejection.
    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/oauth/token",
            &json!({
                "grantType": "authorization_code",
                "code": "does-not-exist",
                "clientId": CLIENT_ID,
                "redirectUri": REDIRECT_URI,
            }),
        ))
        .await
        .expect("token");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "invalid authorization code"
    );

    // Invalid bearer token on userinfo.
    let response = app
        .oneshot(post_json(
            "/v1/oauth/userinfo",
            &json!({ "accessToken": "bogus" }),
        ))
        .await
        .expect("userinfo");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn mfa_lifecycle_over_http() {
    let app = app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/oauth/authenticate",
            &json!({
                "provider": "email",
                "email": "alice@example.com",
                "clientId": CLIENT_ID,
                "redirectUri": REDIRECT_URI,
                "state": state_param(),
            }),
        ))
        .await
        .expect("authenticate");
    let cookie = session_cookie_pair(&response);

    // Unauthenticated MFA calls are rejected.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/mfa/enroll/start")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("enroll unauthenticated");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Stage and confirm enrollment.
    let response = app
        .clone()
        .oneshot(with_cookie(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/mfa/enroll/start")
                .body(Body::empty())
                .expect("request"),
            &cookie,
        ))
        .await
        .expect("enroll start");
    assert_eq!(response.status(), StatusCode::OK);
    let enrollment = body_json(response).await;
    let secret = enrollment["secret"].as_str().expect("secret").to_string();
    assert!(
        enrollment["provisioning_uri"]
            .as_str()
            .expect("uri")
            .starts_with("otpauth://totp/")
    );
    let backup_codes: Vec<String> = enrollment["backup_codes"]
        .as_array()
        .expect("codes")
        .iter()
        .map(|code| code.as_str().expect("code").to_string())
        .collect();
    assert_eq!(backup_codes.len(), 10);

    let response = app
        .clone()
        .oneshot(with_cookie(
            post_json(
                "/v1/auth/mfa/enroll/finish",
                &json!({ "secret": secret, "backup_codes": backup_codes }),
            ),
            &cookie,
        ))
        .await
        .expect("enroll finish");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // A backup code verifies once, then never again.
    let response = app
        .clone()
        .oneshot(with_cookie(
            post_json("/v1/auth/mfa/verify", &json!({ "code": backup_codes[0] })),
            &cookie,
        ))
        .await
        .expect("verify");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    let response = app
        .clone()
        .oneshot(with_cookie(
            post_json("/v1/auth/mfa/verify", &json!({ "code": backup_codes[0] })),
            &cookie,
        ))
        .await
        .expect("verify replay");
    assert_eq!(body_json(response).await["success"], false);

    let response = app
        .clone()
        .oneshot(with_cookie(get("/v1/auth/mfa/status"), &cookie))
        .await
        .expect("status");
    let status = body_json(response).await;
    assert_eq!(status["enabled"], true);
    assert_eq!(status["backup_codes_remaining"], 9);

    // Disable clears everything.
    let response = app
        .clone()
        .oneshot(with_cookie(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/mfa/disable")
                .body(Body::empty())
                .expect("request"),
            &cookie,
        ))
        .await
        .expect("disable");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(with_cookie(get("/v1/auth/mfa/status"), &cookie))
        .await
        .expect("status after disable");
    let status = body_json(response).await;
    assert_eq!(status["enabled"], false);
    assert_eq!(status["backup_codes_remaining"], 0);
}

//! End-to-end flow over the in-memory wiring: code issuance, token exchange,
//! user info, session credential minting/verification, and device-session
//! revocation layered on top.

use chrono::Duration;
use secrecy::SecretString;
use std::sync::Arc;
use wukong_idp::{
    api::{AuthConfig, AuthState},
    audit::MemoryAuditStore,
    identity::{IdentityProfile, MemoryIdentityStore},
    oauth::{ExchangeRequest, GRANT_TYPE_AUTHORIZATION_CODE},
    session::{DeviceMeta, MemoryDeviceSessionStore},
    totp::MemoryMfaStore,
};

const CLIENT_ID: &str = "app-1";
const REDIRECT_URI: &str = "https://x/cb";
const SUBJECT: &str = "google:42";

fn auth_state() -> Arc<AuthState> {
    let config = AuthConfig::new(
        "https://console.wukong.dev".to_string(),
        CLIENT_ID.to_string(),
        SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
    )
    .with_session_ttl_seconds(3600);
    Arc::new(AuthState::new(
        config,
        Arc::new(MemoryIdentityStore::new()),
        Arc::new(MemoryMfaStore::new()),
        Arc::new(MemoryDeviceSessionStore::new()),
        Arc::new(MemoryAuditStore::new()),
    ))
}

async fn seed_subject(state: &AuthState) {
    state
        .identities()
        .upsert(
            SUBJECT,
            IdentityProfile {
                display_name: Some("Alice".to_string()),
                email: Some("alice@example.com".to_string()),
                login_method: Some("google".to_string()),
            },
        )
        .await
        .expect("seed identity");
}

fn exchange_request(code: &str) -> ExchangeRequest {
    ExchangeRequest {
        grant_type: GRANT_TYPE_AUTHORIZATION_CODE.to_string(),
        code: code.to_string(),
        client_id: CLIENT_ID.to_string(),
        redirect_uri: REDIRECT_URI.to_string(),
    }
}

#[tokio::test]
async fn full_sign_in_flow() {
    let state = auth_state();
    seed_subject(&state).await;

    // Primary authentication succeeded; the broker mints a code.
    let code = state
        .oauth()
        .issue_code(CLIENT_ID, REDIRECT_URI, SUBJECT)
        .await;

    // Code exchange yields an access token and a verifiable ID assertion.
    let grant = state
        .oauth()
        .exchange(&exchange_request(&code))
        .await
        .expect("exchange");
    assert_eq!(grant.token_type, "Bearer");
    let id_claims = state
        .signer()
        .verify_id_token(&grant.id_token, CLIENT_ID)
        .expect("id assertion");
    assert_eq!(id_claims.sub, SUBJECT);

    // The access token resolves to the subject's profile.
    let identity = state
        .oauth()
        .user_info(&grant.access_token)
        .await
        .expect("user info");
    assert_eq!(identity.external_id, SUBJECT);
    assert_eq!(identity.display_name.as_deref(), Some("Alice"));

    // Session credential: mint, verify, and bind to a device session.
    let device_token = state
        .sessions()
        .create(SUBJECT, DeviceMeta::default())
        .await
        .expect("device session");
    let credential = state
        .signer()
        .mint_session(SUBJECT, CLIENT_ID, "Alice", Some(&device_token), Duration::seconds(3600))
        .expect("mint session");

    let claims = state.signer().verify_session(&credential).expect("verify");
    assert_eq!(claims.sub, SUBJECT);
    assert_eq!(claims.name, "Alice");
    assert!(state
        .sessions()
        .is_live(claims.sid.as_deref().expect("sid"))
        .await
        .expect("liveness"));
}

#[tokio::test]
async fn code_is_single_use_and_binding_checked() {
    let state = auth_state();
    seed_subject(&state).await;
    let code = state
        .oauth()
        .issue_code(CLIENT_ID, REDIRECT_URI, SUBJECT)
        .await;

    // Wrong redirect first: rejected without consuming the code.
    let mut wrong_redirect = exchange_request(&code);
    wrong_redirect.redirect_uri = "https://evil/cb".to_string();
    assert!(state.oauth().exchange(&wrong_redirect).await.is_err());

    assert!(state.oauth().exchange(&exchange_request(&code)).await.is_ok());
    assert!(state.oauth().exchange(&exchange_request(&code)).await.is_err());
}

#[tokio::test]
async fn session_credential_expiry_and_tampering() {
    let state = auth_state();

    let expired = state
        .signer()
        .mint_session(SUBJECT, CLIENT_ID, "Alice", None, Duration::seconds(-5))
        .expect("mint expired");
    assert!(state.signer().verify_session(&expired).is_none());

    let credential = state
        .signer()
        .mint_session(SUBJECT, CLIENT_ID, "Alice", None, Duration::seconds(3600))
        .expect("mint");
    let mut tampered = credential.clone().into_bytes();
    let index = tampered.len() / 2;
    tampered[index] = if tampered[index] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered).expect("utf8");
    assert!(state.signer().verify_session(&tampered).is_none());
    assert!(state.signer().verify_session(&credential).is_some());
}

#[tokio::test]
async fn revocation_overrides_cryptographic_validity() {
    let state = auth_state();
    seed_subject(&state).await;

    let device_token = state
        .sessions()
        .create(SUBJECT, DeviceMeta::default())
        .await
        .expect("device session");
    let credential = state
        .signer()
        .mint_session(SUBJECT, CLIENT_ID, "Alice", Some(&device_token), Duration::seconds(3600))
        .expect("mint");

    let sessions = state.sessions().list(SUBJECT).await.expect("list");
    assert_eq!(sessions.len(), 1);
    state
        .sessions()
        .revoke(sessions[0].id, SUBJECT, false)
        .await
        .expect("revoke");

    // Signature and expiry still pass; liveness must not.
    let claims = state.signer().verify_session(&credential).expect("verify");
    assert!(!state
        .sessions()
        .is_live(claims.sid.as_deref().expect("sid"))
        .await
        .expect("liveness"));
}

#[tokio::test]
async fn revoke_all_only_hits_one_subject() {
    let state = auth_state();

    let token_alice_1 = state
        .sessions()
        .create("google:1", DeviceMeta::default())
        .await
        .expect("create");
    let token_alice_2 = state
        .sessions()
        .create("google:1", DeviceMeta::default())
        .await
        .expect("create");
    let token_bob = state
        .sessions()
        .create("google:2", DeviceMeta::default())
        .await
        .expect("create");

    state.sessions().revoke_all("google:1").await.expect("revoke all");

    assert!(!state.sessions().is_live(&token_alice_1).await.expect("live"));
    assert!(!state.sessions().is_live(&token_alice_2).await.expect("live"));
    assert!(state.sessions().is_live(&token_bob).await.expect("live"));
}

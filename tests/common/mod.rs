//! Shared helpers for Passage integration tests
//!
//! Mints RS256 tokens with a fixture key and serves the matching JWKS and
//! user records from a wiremock server.

#![allow(dead_code)]

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use passage_auth::config::{PassageConfig, TokenSource};
use serde::Serialize;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const APP_ID: &str = "test-app";
pub const API_KEY: &str = "test-api-key";
pub const KID: &str = "test-key-1";

/// RSA private key (2048-bit, for testing only)
const PRIVATE_KEY_PEM: &str = include_str!("../fixtures/passage_test_key.pem");

/// Modulus of the fixture key, base64url encoded
const MODULUS: &str = "sAVcTyB7sdG923-C_t6aESIvuGQiOlXONUltZ46GJFPrDYHqP4P5g-G4fsdmIBDe4Q_1cR7wM7GwiAPPEbmm5wcvwbnv5uN2wFz8SIxFqn9rVPs4j-DlGB8Ml8j_Cge13L4LAJGE9mbSnf6jQJGQu49WY3NQ7eIsAG0ndlr10r3UAw1MYa15Q_M90HriLxaCdWWj_6Tc4S52XUiW6WBodUnf1CRv77pCnsUVZ-JqzQDBT2fW39ASvm5RHCsWBag38uJT_Hvj74EushP_zlBHg6gj5kq3iOXifLe9a0zWUSOj05MDi8A5zeNx_54U2Z06WlEN_RTGdc-On9EnCltukQ";

#[derive(Serialize)]
struct TestClaims<'a> {
    sub: &'a str,
    exp: i64,
    iat: i64,
    iss: String,
}

/// Mint a Passage-style auth token for `sub`, expiring `ttl_secs` from now
pub fn mint_token(sub: &str, ttl_secs: i64, kid: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = TestClaims {
        sub,
        exp: now + ttl_secs,
        iat: now,
        iss: format!("https://auth.passage.id/v1/apps/{}", APP_ID),
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(
        &header,
        &claims,
        &EncodingKey::from_rsa_pem(PRIVATE_KEY_PEM.as_bytes()).unwrap(),
    )
    .unwrap()
}

pub fn jwks_body(kid: &str) -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "alg": "RS256",
            "n": MODULUS,
            "e": "AQAB"
        }]
    })
}

pub fn jwks_path() -> String {
    format!("/v1/apps/{}/.well-known/jwks.json", APP_ID)
}

pub fn user_path(user_id: &str) -> String {
    format!("/v1/apps/{}/users/{}", APP_ID, user_id)
}

/// Serve the fixture JWKS
pub async fn mount_jwks(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(jwks_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(KID)))
        .mount(server)
        .await;
}

/// Serve `user` from the management API, requiring the API key
pub async fn mount_user(server: &MockServer, user_id: &str, user: Value) {
    Mock::given(method("GET"))
        .and(path(user_path(user_id)))
        .and(header("authorization", format!("Bearer {}", API_KEY).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "user": user })))
        .mount(server)
        .await;
}

pub fn john_doe(user_id: &str) -> Value {
    json!({
        "id": user_id,
        "email": "a@b.com",
        "phone": "+15005550006",
        "status": "active",
        "email_verified": true,
        "user_metadata": {"firstName": "John", "lastName": "Doe"},
        "webauthn": false
    })
}

/// Passage configuration pointed at the mock server
pub fn config_for(server: &MockServer, source: TokenSource) -> PassageConfig {
    let mut config = PassageConfig::new(APP_ID, API_KEY);
    config.auth_origin = server.uri();
    config.api_origin = server.uri();
    config.token_source = source;
    config
}

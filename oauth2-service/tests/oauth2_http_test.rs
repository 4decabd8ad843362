mod common;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use common::*;
use http_body_util::BodyExt;
use oauth2_service::{
    build_router,
    dtos::{
        oauth2::{AuthorizeResponse, IntrospectResponse, RevokeResponse, TokenResponse},
        ErrorResponse,
    },
    models::AccountStatus,
};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use tower::util::ServiceExt;

fn router(env: &TestEnv) -> Router {
    build_router(env.app_state())
}

fn form_request(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let body = serde_urlencoded::to_string(fields).expect("encode form");
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .expect("build request")
}

fn restricted_token_request(peer: Option<&str>, forwarded_for: &str) -> Request<Body> {
    let mut request = form_request(
        "/oauth2/token",
        &[
            ("grant_type", "client_credentials"),
            ("client_id", RESTRICTED_APP),
            ("client_secret", RESTRICTED_SECRET),
        ],
    );
    request.headers_mut().insert(
        "x-forwarded-for",
        forwarded_for.parse().expect("header value"),
    );
    if let Some(peer) = peer {
        let ip: std::net::IpAddr = peer.parse().expect("peer ip");
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::new(ip, 40000)));
    }
    request
}

async fn json_body<T: DeserializeOwned>(response: Response) -> T {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("decode body")
}

async fn password_token(env: &TestEnv) -> TokenResponse {
    let response = router(env)
        .oneshot(form_request(
            "/oauth2/token",
            &[
                ("grant_type", "password"),
                ("client_id", WEB_APP),
                ("client_secret", WEB_SECRET),
                ("username", ALICE_EMAIL),
                ("password", PASSWORD),
            ],
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

fn introspect_request(access_token: &str) -> Request<Body> {
    Request::builder()
        .uri("/oauth2/introspect")
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
        .body(Body::empty())
        .expect("build request")
}

#[tokio::test]
async fn test_health_check() {
    let env = TestEnv::new();
    let response = router(&env)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("build request"))
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body: serde_json::Value = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let env = TestEnv::new();
    let response = router(&env)
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");

    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok()),
        Some("req-123")
    );
}

#[tokio::test]
async fn test_token_endpoint_password_grant() {
    let env = TestEnv::new();
    let token = password_token(&env).await;

    assert_eq!(token.token_type, "Bearer");
    assert_eq!(token.scope, "read write default user application_owner");
    assert!(token.refresh_token.is_some());
    assert!(token.expires_at > chrono::Utc::now().timestamp_millis());
}

#[tokio::test]
async fn test_token_endpoint_error_mapping() {
    let env = TestEnv::new();

    let response = router(&env)
        .oneshot(form_request(
            "/oauth2/token",
            &[
                ("grant_type", "client_credentials"),
                ("client_id", SERVICE_APP),
                ("client_secret", "wrong"),
            ],
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let error: ErrorResponse = json_body(response).await;
    assert_eq!(error.error, "invalid_client");

    let response = router(&env)
        .oneshot(form_request(
            "/oauth2/token",
            &[
                ("grant_type", "implicit"),
                ("client_id", SERVICE_APP),
                ("client_secret", SERVICE_SECRET),
            ],
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = json_body(response).await;
    assert_eq!(error.error, "unsupported_grant_type");
}

#[tokio::test]
async fn test_forwarded_header_from_untrusted_peer_is_ignored() {
    let env = TestEnv::new();

    let response = router(&env)
        .oneshot(restricted_token_request(Some("198.51.100.1"), ALLOWED_IP))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let error: ErrorResponse = json_body(response).await;
    assert_eq!(error.error, "invalid_client");

    let response = router(&env)
        .oneshot(restricted_token_request(None, ALLOWED_IP))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_restriction_matches_socket_peer() {
    let env = TestEnv::new();
    let response = router(&env)
        .oneshot(restricted_token_request(Some(ALLOWED_IP), "198.51.100.1"))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_restriction_behind_trusted_proxy() {
    let env = TestEnv::new();
    let mut state = env.app_state();
    state.config.trusted_proxies = vec!["10.0.0.1".parse().expect("proxy ip")];

    let response = build_router(state.clone())
        .oneshot(restricted_token_request(Some("10.0.0.1"), ALLOWED_IP))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let response = build_router(state)
        .oneshot(restricted_token_request(
            Some("10.0.0.1"),
            "203.0.113.7, 198.51.100.1",
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_policy_error_carries_account_id() {
    let env = TestEnv::new();
    let response = router(&env)
        .oneshot(form_request(
            "/oauth2/token",
            &[
                ("grant_type", "password"),
                ("client_id", WEB_APP),
                ("client_secret", WEB_SECRET),
                ("username", DAVE_EMAIL),
                ("password", PASSWORD),
            ],
        ))
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let error: ErrorResponse = json_body(response).await;
    assert_eq!(error.error, "account_cancelled");
    assert_eq!(error.account_id.as_deref(), Some(DAVE));
}

#[tokio::test]
async fn test_authorize_then_redeem_code() {
    let env = TestEnv::new();

    let response = router(&env)
        .oneshot(form_request(
            "/oauth2/authorize",
            &[
                ("client_id", WEB_APP),
                ("user_id", ALICE),
                ("redirect_uri", REDIRECT_URI),
                ("scope", "read"),
                ("state", "abc"),
            ],
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let authorized: AuthorizeResponse = json_body(response).await;
    assert_eq!(authorized.state.as_deref(), Some("abc"));

    let response = router(&env)
        .oneshot(form_request(
            "/oauth2/token",
            &[
                ("grant_type", "authorization_code"),
                ("client_id", WEB_APP),
                ("client_secret", WEB_SECRET),
                ("code", authorized.code.as_str()),
                ("redirect_uri", REDIRECT_URI),
            ],
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let token: TokenResponse = json_body(response).await;
    assert_eq!(token.scope, "read default user application_owner");
}

#[tokio::test]
async fn test_introspect_requires_bearer_token() {
    let env = TestEnv::new();
    let response = router(&env)
        .oneshot(
            Request::builder()
                .uri("/oauth2/introspect")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router(&env)
        .oneshot(introspect_request("not-a-token"))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let error: ErrorResponse = json_body(response).await;
    assert_eq!(error.error, "token_expired");
}

#[tokio::test]
async fn test_introspect_active_token() {
    let env = TestEnv::new();
    let token = password_token(&env).await;

    let response = router(&env)
        .oneshot(introspect_request(&token.access_token))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let introspection: IntrospectResponse = json_body(response).await;
    assert!(introspection.active);
    assert_eq!(introspection.client_id, WEB_APP);
    assert_eq!(introspection.user_id.as_deref(), Some(ALICE));
    assert_eq!(introspection.token_type, "user");
    assert_eq!(introspection.scope, token.scope);
}

#[tokio::test]
async fn test_introspect_after_block_is_forbidden() {
    let env = TestEnv::new();
    let token = password_token(&env).await;

    env.update_account(ALICE, |account| account.status = AccountStatus::Cancelled)
        .await;

    let response = router(&env)
        .oneshot(introspect_request(&token.access_token))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let error: ErrorResponse = json_body(response).await;
    assert_eq!(error.error, "account_cancelled");
}

#[tokio::test]
async fn test_revoke_endpoint() {
    let env = TestEnv::new();
    let token = password_token(&env).await;

    let response = router(&env)
        .oneshot(form_request(
            "/oauth2/revoke",
            &[("token", token.access_token.as_str()), ("token_type_hint", "access_token")],
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let revoked: RevokeResponse = json_body(response).await;
    assert!(revoked.revoked);

    let response = router(&env)
        .oneshot(form_request("/oauth2/revoke", &[("token", token.access_token.as_str())]))
        .await
        .expect("request");
    let revoked: RevokeResponse = json_body(response).await;
    assert!(!revoked.revoked);

    let response = router(&env)
        .oneshot(introspect_request(&token.access_token))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_openapi_document_lists_endpoints() {
    let env = TestEnv::new();
    let response = router(&env)
        .oneshot(
            Request::builder()
                .uri("/.well-known/openapi.json")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let doc: serde_json::Value = json_body(response).await;
    assert!(doc["paths"]["/oauth2/token"].is_object());
    assert!(doc["paths"]["/oauth2/introspect"].is_object());
}

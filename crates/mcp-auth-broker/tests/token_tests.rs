//! End-to-end token redemption tests: authorize, callback, then redeem
//! against the token endpoint, with a wiremock upstream provider.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcp_auth_broker::config::Config;
use mcp_auth_broker::server::create_router;
use mcp_auth_broker::upstream::UpstreamClient;

fn build_broker_with(upstream: &MockServer, tweak: impl FnOnce(&mut Config)) -> axum::Router {
    let mut config = Config::for_testing(&upstream.uri());
    tweak(&mut config);
    let client = UpstreamClient::new(&config).unwrap();
    create_router(config, client)
}

fn build_broker(upstream: &MockServer) -> axum::Router {
    build_broker_with(upstream, |_| {})
}

async fn mount_upstream_token(upstream: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "upstream-access",
            "refresh_token": "upstream-refresh",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .mount(upstream)
        .await;
}

fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn url_encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

fn location(response: &axum::response::Response) -> Url {
    let raw = response.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    Url::parse(raw).unwrap()
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
}

/// Run authorize and callback, returning the broker code delivered to the
/// client's redirect URI.
async fn obtain_broker_code(
    app: &axum::Router,
    redirect_uri: &str,
    code_challenge: Option<&str>,
) -> String {
    let mut uri = format!(
        "/authorize?response_type=code&client_id=mcp-remote&redirect_uri={}",
        url_encode(redirect_uri),
    );
    if let Some(challenge) = code_challenge {
        uri.push_str(&format!("&code_challenge={challenge}&code_challenge_method=S256"));
    }
    let response = app
        .clone()
        .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let state_blob = query_param(&location(&response), "state").unwrap();

    let callback = format!("/callback?code=upstream-code&state={state_blob}");
    let response = app
        .clone()
        .oneshot(Request::get(callback.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    query_param(&location(&response), "code").unwrap()
}

async fn redeem(
    app: &axum::Router,
    params: &[(&str, &str)],
) -> (StatusCode, axum::http::HeaderMap, serde_json::Value) {
    let body = serde_urlencoded::to_string(params).unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::post("/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_full_flow_with_pkce() {
    let upstream = MockServer::start().await;
    mount_upstream_token(&upstream).await;
    let app = build_broker(&upstream);

    let challenge = s256_challenge("verifier-abc");
    let code = obtain_broker_code(&app, "http://127.0.0.1:54321/callback", Some(&challenge)).await;

    let (status, headers, json) = redeem(
        &app,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "http://127.0.0.1:54321/callback"),
            ("code_verifier", "verifier-abc"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["access_token"], "upstream-access");
    assert_eq!(json["refresh_token"], "upstream-refresh");
    assert_eq!(json["token_type"], "Bearer");
    assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
    assert_eq!(headers.get(header::PRAGMA).unwrap(), "no-cache");
}

#[tokio::test]
async fn test_code_is_single_use() {
    let upstream = MockServer::start().await;
    mount_upstream_token(&upstream).await;
    let app = build_broker(&upstream);

    let code = obtain_broker_code(&app, "http://127.0.0.1:54321/callback", None).await;
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", "http://127.0.0.1:54321/callback"),
    ];

    let (status, _, _) = redeem(&app, &params).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, json) = redeem(&app, &params).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_grant");
}

#[tokio::test]
async fn test_wrong_verifier_is_invalid_grant() {
    let upstream = MockServer::start().await;
    mount_upstream_token(&upstream).await;
    let app = build_broker(&upstream);

    let challenge = s256_challenge("verifier-abc");
    let code = obtain_broker_code(&app, "http://127.0.0.1:54321/callback", Some(&challenge)).await;

    let (status, _, json) = redeem(
        &app,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "http://127.0.0.1:54321/callback"),
            ("code_verifier", "verifier-wrong"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_grant");
}

#[tokio::test]
async fn test_missing_verifier_when_challenge_bound() {
    let upstream = MockServer::start().await;
    mount_upstream_token(&upstream).await;
    let app = build_broker(&upstream);

    let challenge = s256_challenge("verifier-abc");
    let code = obtain_broker_code(&app, "http://127.0.0.1:54321/callback", Some(&challenge)).await;

    let (status, _, json) = redeem(
        &app,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "http://127.0.0.1:54321/callback"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_request");
}

#[tokio::test]
async fn test_loopback_hosts_are_equivalent_at_redemption() {
    let upstream = MockServer::start().await;
    mount_upstream_token(&upstream).await;
    let app = build_broker(&upstream);

    // Authorized as 127.0.0.1, redeemed as localhost: the same client.
    let code = obtain_broker_code(&app, "http://127.0.0.1:54321/callback", None).await;
    let (status, _, json) = redeem(
        &app,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "http://localhost:54321/callback"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["access_token"], "upstream-access");
}

#[tokio::test]
async fn test_port_mismatch_is_rejected() {
    let upstream = MockServer::start().await;
    mount_upstream_token(&upstream).await;
    let app = build_broker(&upstream);

    let code = obtain_broker_code(&app, "http://127.0.0.1:54321/callback", None).await;
    let (status, _, json) = redeem(
        &app,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "http://127.0.0.1:54322/callback"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_grant");
}

#[tokio::test]
async fn test_client_id_mismatch_is_rejected() {
    let upstream = MockServer::start().await;
    mount_upstream_token(&upstream).await;
    let app = build_broker(&upstream);

    let code = obtain_broker_code(&app, "http://127.0.0.1:54321/callback", None).await;
    let (status, _, json) = redeem(
        &app,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "http://127.0.0.1:54321/callback"),
            ("client_id", "someone-else"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "invalid_client");
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    let upstream = MockServer::start().await;
    mount_upstream_token(&upstream).await;
    let app = build_broker_with(&upstream, |config| {
        config.code_ttl = Duration::from_millis(50);
    });

    let code = obtain_broker_code(&app, "http://127.0.0.1:54321/callback", None).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (status, _, json) = redeem(
        &app,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "http://127.0.0.1:54321/callback"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_grant");
}

#[tokio::test]
async fn test_unknown_code_is_rejected() {
    let upstream = MockServer::start().await;
    let app = build_broker(&upstream);

    let (status, _, json) = redeem(
        &app,
        &[
            ("grant_type", "authorization_code"),
            ("code", "never-issued"),
            ("redirect_uri", "http://127.0.0.1:54321/callback"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_grant");
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let upstream = MockServer::start().await;
    let app = build_broker(&upstream);

    let (status, _, json) = redeem(
        &app,
        &[("grant_type", "client_credentials"), ("code", "x"), ("redirect_uri", "http://x")],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn test_missing_code_is_invalid_request() {
    let upstream = MockServer::start().await;
    let app = build_broker(&upstream);

    let (status, _, json) =
        redeem(&app, &[("grant_type", "authorization_code"), ("redirect_uri", "http://x")]).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_request");
}

#[tokio::test]
async fn test_redemption_reuses_tokens_from_callback_exchange() {
    let upstream = MockServer::start().await;
    // Exactly one upstream exchange for the whole flow: the callback's.
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "upstream-access",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&upstream)
        .await;
    let app = build_broker(&upstream);

    let code = obtain_broker_code(&app, "http://127.0.0.1:54321/callback", None).await;
    let (status, _, json) = redeem(
        &app,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "http://127.0.0.1:54321/callback"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["access_token"], "upstream-access");
}

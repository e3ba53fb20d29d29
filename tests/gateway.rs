//! End-to-end tests of the admission and forwarding pipeline.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use auth_gateway::auth::ADMIN_ROLE;
use auth_gateway::config::GatewayConfig;
use auth_gateway::store::{AllowListEntry, AllowListStore};

mod common;

use common::{client, start_echo_upstream, start_gateway, start_upgrade_echo_upstream, EchoBody};

fn gateway_config(upstream: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.upstream.target_url = format!("http://{upstream}");
    // Generous defaults so only the dedicated test exercises the limiter.
    config.rate_limit.max_requests = 10_000;
    config
}

#[tokio::test]
async fn forwards_with_diagnostic_headers_and_exact_body() {
    let upstream = start_echo_upstream().await;
    let gateway = start_gateway(gateway_config(upstream)).await;
    let token = gateway.verifier.sign("alice", "user").unwrap();

    let payload = r#"{"order":42,"note":"exact bytes please"}"#;
    let response = client()
        .post(format!("http://{}/proxy/orders/submit?dry=1", gateway.addr))
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(payload)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let echo: EchoBody = response.json().await.unwrap();

    // Method, rewritten path, and body bytes arrive unchanged.
    assert_eq!(echo.method, "POST");
    assert_eq!(echo.path, "/orders/submit");
    assert_eq!(echo.body, payload);

    // Headers contract toward the upstream.
    assert!(echo.headers.contains_key("x-proxy-time"));
    assert_eq!(
        echo.headers.get("x-worker-pid").unwrap(),
        &std::process::id().to_string()
    );
    assert_eq!(echo.headers.get("x-forwarded-for").unwrap(), "127.0.0.1");
    assert_eq!(
        echo.headers.get("authorization").unwrap(),
        &format!("Bearer {token}")
    );
}

#[tokio::test]
async fn allow_listed_path_needs_no_token() {
    let upstream = start_echo_upstream().await;
    let gateway = start_gateway(gateway_config(upstream)).await;
    gateway
        .store
        .create(AllowListEntry::new("/proxy/public/status", "open status page"))
        .await
        .unwrap();

    let response = client()
        .get(format!("http://{}/proxy/public/status", gateway.addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let echo: EchoBody = response.json().await.unwrap();
    assert_eq!(echo.path, "/public/status");
}

#[tokio::test]
async fn missing_and_invalid_tokens_are_unauthorized() {
    let upstream = start_echo_upstream().await;
    let gateway = start_gateway(gateway_config(upstream)).await;

    let missing = client()
        .get(format!("http://{}/proxy/private", gateway.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = missing.json().await.unwrap();
    assert_eq!(body["message"], "No token provided");

    let invalid = client()
        .get(format!("http://{}/proxy/private", gateway.addr))
        .header("authorization", "Bearer not.a.real.token")
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = invalid.json().await.unwrap();
    assert_eq!(body["message"], "Invalid token");
}

#[tokio::test]
async fn expired_token_is_unauthorized_not_internal() {
    let upstream = start_echo_upstream().await;
    let gateway = start_gateway(gateway_config(upstream)).await;

    let now = chrono::Utc::now().timestamp();
    let stale = auth_gateway::auth::TokenClaims {
        sub: "bob".into(),
        role: "user".into(),
        iat: now - 7200,
        exp: now - 3600,
    };
    let token = gateway.verifier.sign_claims(&stale).unwrap();

    let response = client()
        .get(format!("http://{}/proxy/private", gateway.addr))
        .header("authorization", format!("Bearer {token}"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn limit_exceeded_rejects_with_retry_after() {
    let upstream = start_echo_upstream().await;
    let mut config = gateway_config(upstream);
    config.rate_limit.max_requests = 3;
    config.rate_limit.window_secs = 900;
    let gateway = start_gateway(config).await;

    // The limiter runs before the auth gate, so tokenless requests are
    // counted: three 401s, then a 429.
    for _ in 0..3 {
        let response = client()
            .get(format!("http://{}/proxy/burst", gateway.addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let rejected = client()
        .get(format!("http://{}/proxy/burst", gateway.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = rejected
        .headers()
        .get("retry-after")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 900);

    let body: serde_json::Value = rejected.json().await.unwrap();
    assert!(body["retryAfter"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn limits_key_on_source_address_regardless_of_identity() {
    let upstream = start_echo_upstream().await;
    let mut config = gateway_config(upstream);
    config.rate_limit.max_requests = 2;
    let gateway = start_gateway(config).await;
    let token = gateway.verifier.sign("alice", "user").unwrap();

    // One anonymous and one authenticated request drain the same
    // per-address budget; the third request is over it either way.
    let anonymous = client()
        .get(format!("http://{}/proxy/mixed", gateway.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let authenticated = client()
        .get(format!("http://{}/proxy/mixed", gateway.addr))
        .header("authorization", format!("Bearer {token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(authenticated.status(), StatusCode::OK);

    let rejected = client()
        .get(format!("http://{}/proxy/mixed", gateway.addr))
        .header("authorization", format!("Bearer {token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn upgraded_connections_are_spliced_both_ways() {
    let upstream = start_upgrade_echo_upstream().await;
    let gateway = start_gateway(gateway_config(upstream)).await;
    let token = gateway.verifier.sign("alice", "user").unwrap();

    let mut stream = TcpStream::connect(gateway.addr).await.unwrap();
    let request = format!(
        "GET /proxy/socket HTTP/1.1\r\n\
         Host: gateway.local\r\n\
         Connection: Upgrade\r\n\
         Upgrade: echo\r\n\
         Authorization: Bearer {token}\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    // Read the response head only; the connection then leaves HTTP.
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&head);
    assert!(
        head.starts_with("HTTP/1.1 101"),
        "expected 101 Switching Protocols, got: {head}"
    );

    // Bytes written after the upgrade round-trip through the upstream echo.
    stream.write_all(b"ping over the splice").await.unwrap();
    let mut echo = [0u8; 20];
    stream.read_exact(&mut echo).await.unwrap();
    assert_eq!(&echo, b"ping over the splice");
}

#[tokio::test]
async fn admin_endpoints_enforce_the_role_boundary() {
    let upstream = start_echo_upstream().await;
    let gateway = start_gateway(gateway_config(upstream)).await;
    let admin_token = gateway.verifier.sign("root", ADMIN_ROLE).unwrap();
    let user_token = gateway.verifier.sign("mallory", "user").unwrap();
    let url = format!("http://{}/api/no-auth-routes", gateway.addr);

    // Anonymous: 401. Authenticated non-admin: 403.
    let anonymous = client()
        .post(&url)
        .json(&serde_json::json!({ "path": "/proxy/open" }))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let forbidden = client()
        .post(&url)
        .header("authorization", format!("Bearer {user_token}"))
        .json(&serde_json::json!({ "path": "/proxy/open" }))
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    // Admin create succeeds; the duplicate is a conflict, not an overwrite.
    let created = client()
        .post(&url)
        .header("authorization", format!("Bearer {admin_token}"))
        .json(&serde_json::json!({ "path": "/proxy/open", "description": "launch window" }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let duplicate = client()
        .post(&url)
        .header("authorization", format!("Bearer {admin_token}"))
        .json(&serde_json::json!({ "path": "/proxy/open" }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    // The created entry takes effect for unauthenticated traffic.
    let bypassed = client()
        .get(format!("http://{}/proxy/open", gateway.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(bypassed.status(), StatusCode::OK);

    // Listing is admin-only too.
    let listing = client()
        .get(&url)
        .header("authorization", format!("Bearer {admin_token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(listing.status(), StatusCode::OK);
    let entries: Vec<serde_json::Value> = listing.json().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["path"], "/proxy/open");
}

#[tokio::test]
async fn unreachable_upstream_is_a_gateway_error_not_a_hang() {
    // Reserve a port, then free it so nothing listens there.
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let gateway = start_gateway(gateway_config(dead_addr)).await;
    let token = gateway.verifier.sign("alice", "user").unwrap();

    let started = std::time::Instant::now();
    let response = client()
        .get(format!("http://{}/proxy/anything", gateway.addr))
        .header("authorization", format!("Bearer {token}"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(started.elapsed() < Duration::from_secs(31));
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Upstream request failed");
}

#[tokio::test]
async fn health_bypasses_the_pipeline() {
    let upstream = start_echo_upstream().await;
    let mut config = gateway_config(upstream);
    // A zero-budget limiter must not affect liveness probes.
    config.rate_limit.max_requests = 1;
    let gateway = start_gateway(config).await;

    for _ in 0..5 {
        let response = client()
            .get(format!("http://{}/health", gateway.addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "OK");
        assert_eq!(body["pid"].as_u64().unwrap(), u64::from(std::process::id()));
        assert!(body["timestamp"].is_string());
    }
}

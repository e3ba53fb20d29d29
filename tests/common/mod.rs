//! Shared utilities for integration testing.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{body::Body, extract::Request, http::StatusCode, response::IntoResponse, Json, Router};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use auth_gateway::auth::TokenVerifier;
use auth_gateway::config::GatewayConfig;
use auth_gateway::http::{GatewayApp, WorkerInfo};
use auth_gateway::lifecycle::Shutdown;
use auth_gateway::store::{AllowListStore, CounterStore, MemoryStore};

/// What the echo upstream observed about a request.
#[derive(Debug, Serialize, Deserialize)]
pub struct EchoBody {
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Start a mock upstream that echoes method, path, headers, and body back
/// as JSON. Returns its address.
pub async fn start_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new().fallback(echo_handler);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

async fn echo_handler(request: Request<Body>) -> impl IntoResponse {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let headers: BTreeMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();
    let body_bytes = axum::body::to_bytes(request.into_body(), 1024 * 1024)
        .await
        .unwrap_or_default();

    (
        StatusCode::OK,
        Json(EchoBody {
            method,
            path,
            headers,
            body: String::from_utf8_lossy(&body_bytes).into_owned(),
        }),
    )
}

/// Start a raw upstream that answers any request with `101 Switching
/// Protocols` and then echoes every byte on the upgraded connection.
#[allow(dead_code)]
pub async fn start_upgrade_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                // Consume the request head.
                let mut head = Vec::new();
                let mut byte = [0u8; 1];
                while !head.ends_with(b"\r\n\r\n") {
                    if socket.read_exact(&mut byte).await.is_err() {
                        return;
                    }
                    head.push(byte[0]);
                }

                let response = b"HTTP/1.1 101 Switching Protocols\r\n\
                    Connection: Upgrade\r\n\
                    Upgrade: echo\r\n\r\n";
                if socket.write_all(response).await.is_err() {
                    return;
                }

                let mut data = [0u8; 1024];
                loop {
                    match socket.read(&mut data).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if socket.write_all(&data[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });

    addr
}

/// A gateway worker running against in-memory stores.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    pub verifier: TokenVerifier,
    pub shutdown: Shutdown,
}

pub const TEST_SECRET: &str = "integration-test-secret";

/// Start one gateway worker on an ephemeral port.
pub async fn start_gateway(mut config: GatewayConfig) -> TestGateway {
    if config.auth.jwt_secret.is_empty() {
        config.auth.jwt_secret = TEST_SECRET.to_string();
    }
    let secret = config.auth.jwt_secret.clone();
    let ttl = config.auth.token_ttl_secs;

    let store = Arc::new(MemoryStore::new());
    let app = GatewayApp::new(
        Arc::new(config),
        store.clone() as Arc<dyn CounterStore>,
        store.clone() as Arc<dyn AllowListStore>,
    )
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router(WorkerInfo {
        index: 0,
        port: addr.port(),
    });

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = GatewayApp::serve(listener, router, rx).await;
    });

    TestGateway {
        addr,
        store,
        verifier: TokenVerifier::new(&secret, ttl),
        shutdown,
    }
}

/// HTTP client that talks straight to the local gateway.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

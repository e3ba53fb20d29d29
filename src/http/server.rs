//! HTTP server setup and pipeline assembly.
//!
//! # Responsibilities
//! - Build the Axum router one worker at a time
//! - Make the admission pipeline order explicit: rate limit → auth gate →
//!   forwarding; the sequence is a contract, not a registration artifact
//! - Health endpoint outside the pipeline (liveness must not consume
//!   admission budget or demand a token)
//! - Serve with graceful shutdown per worker

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin;
use crate::auth::{auth_gate_middleware, AuthGate, TokenVerifier};
use crate::config::GatewayConfig;
use crate::http::proxy::Forwarder;
use crate::observability::metrics;
use crate::security::{rate_limit_middleware, RateLimiter};
use crate::store::{AllowListStore, CounterStore};

/// Application state injected into handlers. Clones are cheap handles.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub limiter: Arc<RateLimiter>,
    pub auth_gate: Arc<AuthGate>,
    pub allow_list: Arc<dyn AllowListStore>,
    pub forwarder: Forwarder,
}

/// Identity of the worker serving a request, reported by `/health`.
#[derive(Clone, Copy, Debug)]
pub struct WorkerInfo {
    pub index: usize,
    pub port: u16,
}

/// The full serving pipeline, shared by every worker.
pub struct GatewayApp {
    state: AppState,
}

impl GatewayApp {
    /// Wire the pipeline components against the given stores.
    pub fn new(
        config: Arc<GatewayConfig>,
        counter_store: Arc<dyn CounterStore>,
        allow_list: Arc<dyn AllowListStore>,
    ) -> Result<Self, String> {
        let verifier = Arc::new(TokenVerifier::new(
            &config.auth.jwt_secret,
            config.auth.token_ttl_secs,
        ));
        let limiter = Arc::new(RateLimiter::new(
            counter_store,
            config.rate_limit.clone(),
            &config.store.rate_limit_prefix,
        ));
        let auth_gate = Arc::new(AuthGate::new(allow_list.clone(), verifier));
        let forwarder = Forwarder::new(&config.upstream, config.environment)?;

        Ok(Self {
            state: AppState {
                config,
                limiter,
                auth_gate,
                allow_list,
                forwarder,
            },
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build one worker's router.
    pub fn router(&self, worker: WorkerInfo) -> Router {
        let state = self.state.clone();
        let prefix = state.config.upstream.path_prefix.clone();

        // Admission pipeline. Axum layers execute outside-in, so the
        // stage order below reads bottom-up: rate limit first, then auth.
        let mut pipeline = Router::new()
            .route(&prefix, any(proxy_handler))
            .route(&format!("{prefix}/{{*path}}"), any(proxy_handler))
            .with_state(state.clone())
            .merge(admin::router(&state))
            .layer(middleware::from_fn_with_state(
                state.auth_gate.clone(),
                auth_gate_middleware,
            ));
        if state.config.rate_limit.enabled {
            pipeline = pipeline.layer(middleware::from_fn_with_state(
                state.limiter.clone(),
                rate_limit_middleware,
            ));
        }

        Router::new()
            .route("/health", get(health_handler))
            .with_state(worker)
            .merge(pipeline)
            .layer(cors_layer(&state.config))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve one worker until the shutdown signal fires, then drain
    /// in-flight requests before returning.
    pub async fn serve(
        listener: TcpListener,
        router: Router,
        mut shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
    }
}

fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    if config.cors.allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

/// Forward an admitted request upstream.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    match state.forwarder.forward(request, addr).await {
        Ok(response) => {
            metrics::record_request(&method, response.status().as_u16(), start);
            response.into_response()
        }
        Err(error) => {
            metrics::record_request(&method, error.status().as_u16(), start);
            error.into_response()
        }
    }
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    pid: u32,
    worker: usize,
}

/// Per-worker liveness endpoint. Bypasses the admission pipeline so
/// orchestration probes always succeed while the worker is alive.
async fn health_handler(State(worker): State<WorkerInfo>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "OK",
        timestamp: chrono::Utc::now(),
        pid: std::process::id(),
        worker: worker.index,
    })
}

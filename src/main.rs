//! Authenticating API Gateway
//!
//! An API gateway built with Tokio and Axum: it terminates client HTTP,
//! admits requests through a shared-state rate limiter and a bearer-token
//! auth gate with a dynamic allow-list bypass, and reverse-proxies admitted
//! traffic to a configured upstream.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────────────────────────────────┐
//!                   │                 GATEWAY PROCESS                   │
//!                   │                                                   │
//!   Client ─────────┼─▶ worker i (port base+i)                          │
//!                   │     ├─ rate limit ──▶ auth gate ──▶ forwarder ────┼──▶ Upstream
//!                   │     │   (counter      (allow-list,    (rewrite,   │
//!                   │     │    store)        verifier)       headers)   │
//!                   │     └─ /health                                    │
//!                   │                                                   │
//!                   │   supervisor: restart-on-exit, graceful drain     │
//!                   │   shared state: Redis (counters, allow-list)      │
//!                   └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use auth_gateway::config::{load_config, GatewayConfig};
use auth_gateway::http::GatewayApp;
use auth_gateway::lifecycle::{check_dependencies, signals, Shutdown, StartupError};
use auth_gateway::observability::{logging, metrics};
use auth_gateway::store::{AllowListStore, CounterStore, RedisStore};
use auth_gateway::supervisor::Supervisor;

#[derive(Parser, Debug)]
#[command(name = "auth-gateway", about = "Authenticating API gateway")]
struct Cli {
    /// Path to a TOML configuration file. Environment variables override
    /// file values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured worker count.
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("fatal: {error}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(workers) = cli.workers {
        config.listener.workers = workers;
    }

    logging::init_logging(&config.observability, config.environment);

    match run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(error) => {
            tracing::error!(error = %error, "Fatal startup failure");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    let config = Arc::new(config);

    tracing::info!(
        base_port = config.listener.base_port,
        workers = config.listener.workers,
        upstream = %config.upstream.target_url,
        environment = ?config.environment,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Shared state behind the store traits. One Redis connection manager
    // serves both the counters and the allow-list.
    let redis = RedisStore::connect(&config.store.url, &config.store.allow_list_key)
        .await
        .map_err(|e| StartupError::StoreUnreachable(e.to_string()))?;
    let counter_store: Arc<dyn CounterStore> = Arc::new(redis.clone());
    let allow_list: Arc<dyn AllowListStore> = Arc::new(redis);

    // A gateway that cannot count admissions must not serve.
    check_dependencies(&counter_store).await?;
    tracing::info!(url = %config.store.url, "Counter store reachable");

    let app = GatewayApp::new(config.clone(), counter_store, allow_list)
        .map_err(StartupError::Forwarder)?;

    let shutdown = Shutdown::new();
    tokio::spawn(signals::listen_for_termination(shutdown.clone()));

    let supervisor = Supervisor::new(config, app, shutdown);
    supervisor.run().await?;

    Ok(())
}

//! Startup orchestration.
//!
//! # Responsibilities
//! - Verify external dependencies before any listener binds
//! - Fail fast: a gateway that cannot count admissions must not serve
//!
//! # Design Decisions
//! - Boot-time dependency failure exits the process with code 1 instead
//!   of serving degraded traffic silently

use std::sync::Arc;

use crate::store::CounterStore;

/// Fatal boot failure. The process maps this to exit code 1.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("counter store unreachable at boot: {0}")]
    StoreUnreachable(String),

    #[error("forwarder initialization failed: {0}")]
    Forwarder(String),

    #[error("listener bind failed: {0}")]
    Bind(#[from] std::io::Error),
}

/// Probe the counter store once before accepting traffic.
pub async fn check_dependencies(store: &Arc<dyn CounterStore>) -> Result<(), StartupError> {
    store
        .ping()
        .await
        .map_err(|e| StartupError::StoreUnreachable(e.to_string()))
}

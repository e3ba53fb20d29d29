//! Authenticating API Gateway Library
//!
//! Request-admission and forwarding pipeline: shared-state rate limiting,
//! allow-list-aware bearer-token authentication, reverse-proxy forwarding
//! with diagnostic headers, and a supervised multi-worker fleet.

pub mod admin;
pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod store;
pub mod supervisor;

pub use config::GatewayConfig;
pub use http::{GatewayApp, WorkerInfo};
pub use lifecycle::Shutdown;
pub use supervisor::Supervisor;

//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (one listener per worker)
//!     → server.rs (Axum setup, request ID, CORS, trace)
//!     → security::rate_limit (admission, stage 1)
//!     → auth::gate (allow-list / bearer token, stage 2)
//!     → proxy.rs (rewrite, header injection, forward upstream, stage 3)
//!     → response.rs (error taxonomy → JSON rejections)
//! ```

pub mod proxy;
pub mod response;
pub mod server;

pub use proxy::Forwarder;
pub use response::GatewayError;
pub use server::{AppState, GatewayApp, WorkerInfo};

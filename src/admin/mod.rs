//! Allow-list administration subsystem.
//!
//! # Design Decisions
//! - These endpoints sit inside the same admission pipeline as proxied
//!   traffic, but additionally demand an authenticated `admin` role.
//!   Even if an operator allow-lists `/api/no-auth-routes` itself, the
//!   handlers still refuse anonymous callers: the bypass list's effect is
//!   public, mutations of it are not
//! - Duplicate creates surface the store's uniqueness conflict as 409

pub mod handlers;

use axum::{extract::DefaultBodyLimit, routing::post, Router};
use tower_http::limit::RequestBodyLimitLayer;

use crate::http::server::AppState;

use self::handlers::{create_entry, list_entries};

/// Administrative routes, mounted under the pipeline's auth gate.
pub fn router(state: &AppState) -> Router {
    Router::new()
        .route("/api/no-auth-routes", post(create_entry).get(list_entries))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .with_state(state.clone())
}

//! Handlers for allow-list administration.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{Identity, TokenClaims};
use crate::http::response::GatewayError;
use crate::http::server::AppState;
use crate::store::AllowListEntry;

#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    pub path: String,
    #[serde(default)]
    pub description: String,
}

/// `POST /api/no-auth-routes` — add a path to the bypass list.
pub async fn create_entry(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateEntryRequest>,
) -> Response {
    let claims = match require_admin(identity) {
        Ok(claims) => claims,
        Err(error) => return error.into_response(),
    };

    if !body.path.starts_with('/') {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "path must start with '/'" })),
        )
            .into_response();
    }

    match state
        .allow_list
        .create(AllowListEntry::new(body.path, body.description))
        .await
    {
        Ok(entry) => {
            tracing::info!(path = %entry.path, admin = %claims.sub, "Allow-list entry created");
            (StatusCode::CREATED, Json(entry)).into_response()
        }
        Err(error) => GatewayError::from(error).into_response(),
    }
}

/// `GET /api/no-auth-routes` — list every bypass entry.
pub async fn list_entries(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Response {
    if let Err(error) = require_admin(identity) {
        return error.into_response();
    }

    match state.allow_list.list_all().await {
        Ok(entries) => Json(entries).into_response(),
        Err(error) => GatewayError::from(error).into_response(),
    }
}

/// Admin mutations demand a verified identity with the admin role, even
/// when the auth gate let the request through via the allow-list.
fn require_admin(identity: Identity) -> Result<TokenClaims, GatewayError> {
    let claims = identity.0.ok_or(GatewayError::MissingToken)?;
    if claims.is_admin() {
        Ok(claims)
    } else {
        Err(GatewayError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ADMIN_ROLE;

    fn identity(role: &str) -> Identity {
        Identity(Some(TokenClaims {
            sub: "tester".into(),
            role: role.into(),
            iat: 0,
            exp: i64::MAX,
        }))
    }

    #[test]
    fn admin_passes_role_check() {
        assert!(require_admin(identity(ADMIN_ROLE)).is_ok());
    }

    #[test]
    fn non_admin_is_forbidden() {
        assert_eq!(
            require_admin(identity("user")).unwrap_err(),
            GatewayError::Forbidden
        );
    }

    #[test]
    fn anonymous_is_unauthorized() {
        assert_eq!(
            require_admin(Identity(None)).unwrap_err(),
            GatewayError::MissingToken
        );
    }
}

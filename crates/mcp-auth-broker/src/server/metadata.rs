//! Discovery metadata, dynamic client registration, and health.
//!
//! The metadata documents must describe what the broker actually does:
//! S256 is the only advertised challenge method because it is the only one
//! the verifier accepts, and the advertised endpoints are the broker's
//! own, never the upstream provider's.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::AppState;

/// `GET /health`
pub async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mcp-auth-broker",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// `GET /.well-known/oauth-authorization-server` (RFC 8414)
pub async fn handle_auth_server_metadata(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let base = &state.config.base_url;
    let scopes: Vec<&str> = state.config.default_scope.split_whitespace().collect();

    Json(serde_json::json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/authorize"),
        "token_endpoint": format!("{base}/token"),
        "registration_endpoint": format!("{base}/register"),
        "scopes_supported": scopes,
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code"],
        "token_endpoint_auth_methods_supported": ["none"],
        "code_challenge_methods_supported": ["S256"]
    }))
}

/// `GET /.well-known/oauth-protected-resource` (RFC 9728)
pub async fn handle_protected_resource(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let base = &state.config.base_url;
    let scopes: Vec<&str> = state.config.default_scope.split_whitespace().collect();

    Json(serde_json::json!({
        "resource": base,
        "authorization_servers": [base],
        "bearer_methods_supported": ["header"],
        "scopes_supported": scopes
    }))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub client_name: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

/// `POST /register` (RFC 7591)
///
/// The upstream provider owns the only real client registration, so this
/// echoes the broker's pre-configured client: its id, the broker-side
/// redirect URIs, and the broker's own endpoints. The client secret never
/// leaves the broker.
pub async fn handle_register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    let base = &state.config.base_url;

    tracing::info!(
        client_name = request.client_name.as_deref().unwrap_or("unnamed"),
        requested_uris = request.redirect_uris.len(),
        "Client registration request"
    );

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "client_id": state.config.upstream_client_id,
            "client_name": request.client_name.unwrap_or_else(|| "MCP Client".to_string()),
            "redirect_uris": state.config.fixed_redirect_uris,
            "grant_types": ["authorization_code"],
            "response_types": ["code"],
            "token_endpoint_auth_method": "none",
            "scope": state.config.default_scope,
            "authorization_endpoint": format!("{base}/authorize"),
            "token_endpoint": format!("{base}/token")
        })),
    )
        .into_response()
}

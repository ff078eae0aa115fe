//! The broker's three protocol endpoints.
//!
//! - `GET /authorize` — validates the inbound request, mints a broker
//!   code, and redirects to the upstream provider.
//! - `GET /callback` — receives the upstream redirect, exchanges the
//!   upstream code, and answers in the originating client's convention.
//! - `POST /token` — redeems a broker code for tokens, enforcing PKCE
//!   and single use.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use url::Url;

use crate::broker::classify::{self, ClientType, normalize_redirect_uri};
use crate::broker::types::{BrokerCode, TokenResponse, UpstreamGrant};
use crate::broker::{CodeStore, EncodedState, pkce};
use crate::error::{BrokerError, BrokerResult};

use super::AppState;

// ─── Authorization endpoint ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub resource: Option<String>,
}

/// `GET /authorize`
///
/// On success, answers with a 302 to the upstream provider. Errors go back
/// to the client's redirect URI as `error`/`error_description` query
/// parameters when that URI is present and registered; otherwise they are
/// returned as a structured JSON body.
pub async fn handle_authorize(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    // Errors may only be redirected to a usable, registered URI.
    let error_target = query
        .redirect_uri
        .clone()
        .filter(|uri| classify::redirect_uri_allowed(uri, &state.config));
    let original_state = query.state.clone();

    match authorize(&state, query).await {
        Ok(upstream_url) => found(&upstream_url),
        Err(err) => {
            tracing::warn!(error = %err.error_code(), "Authorization request rejected");
            match error_target {
                Some(uri) => error_redirect(&uri, &err, original_state.as_deref()),
                None => err.into_response(),
            }
        }
    }
}

async fn authorize(state: &AppState, query: AuthorizeQuery) -> BrokerResult<String> {
    if query.response_type.as_deref() != Some("code") {
        return Err(BrokerError::UnsupportedResponseType);
    }

    let Some(client_id) = query.client_id else {
        return Err(BrokerError::invalid_request("client_id is required"));
    };
    let Some(redirect_uri) = query.redirect_uri else {
        return Err(BrokerError::invalid_request("redirect_uri is required"));
    };

    if query.code_challenge.is_some() && query.code_challenge_method.as_deref() != Some("S256") {
        return Err(BrokerError::invalid_request("code_challenge_method must be 'S256'"));
    }

    if let Some(ref resource) = query.resource {
        if !resource_matches_origin(resource, &state.config.base_url) {
            return Err(BrokerError::InvalidTarget);
        }
    }

    if !classify::redirect_uri_allowed(&redirect_uri, &state.config) {
        return Err(BrokerError::invalid_request(
            "redirect_uri matches no registered URI or accepted loopback pattern",
        ));
    }

    let scope = query.scope.unwrap_or_else(|| state.config.default_scope.clone());

    let code = CodeStore::generate_code();
    let now = Instant::now();
    let context = BrokerCode {
        client_id: client_id.clone(),
        redirect_uri: redirect_uri.clone(),
        scope: scope.clone(),
        code_challenge: query.code_challenge,
        code_challenge_method: query.code_challenge_method,
        resource: query.resource.clone(),
        created_at: now,
        expires_at: now + state.config.code_ttl,
        upstream: None,
    };
    state.store.put(code.clone(), context).await;

    let mut encoded = EncodedState::new(redirect_uri, query.state.clone(), Some(code));
    encoded.resource = query.resource;

    let upstream_url = state.upstream.authorize_url(&scope, &encoded.encode());

    tracing::info!(client_id = %client_id, "Issued broker code, redirecting upstream");

    Ok(upstream_url)
}

fn resource_matches_origin(resource: &str, base_url: &str) -> bool {
    let (Ok(resource), Ok(base)) = (Url::parse(resource), Url::parse(base_url)) else {
        return false;
    };
    resource.origin() == base.origin()
}

/// Deliver an error to a known-good redirect URI (RFC 6749 §4.1.2.1).
fn error_redirect(redirect_uri: &str, err: &BrokerError, state: Option<&str>) -> Response {
    let Ok(mut url) = Url::parse(redirect_uri) else {
        // The target passed registration checks, so this is unreachable in
        // practice; fall back to a direct body rather than dropping the error.
        return BrokerError::server("unusable redirect target").into_response();
    };
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("error", err.error_code());
        pairs.append_pair("error_description", &err.to_string());
        if let Some(state) = state {
            pairs.append_pair("state", state);
        }
    }
    found(url.as_str())
}

/// A 302 redirect (RFC 6749 uses 302 for all front-channel redirects).
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

// ─── Upstream callback ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub state: Option<String>,
}

/// `GET /callback`
///
/// The upstream provider's redirect target. Decodes the state blob,
/// exchanges the upstream code, and responds in the convention of the
/// classified client: code forwarding for brokered flows, a direct token
/// payload for directly-tested ones.
pub async fn handle_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        tracing::warn!(error = %error, "Upstream denied authorization");
        return BrokerError::AuthorizationFailed(error).into_response();
    }

    let Some(upstream_code) = query.code else {
        return BrokerError::invalid_request("no authorization code received").into_response();
    };
    let Some(raw_state) = query.state else {
        return BrokerError::invalid_state("missing state parameter").into_response();
    };

    let decoded = match EncodedState::decode(&raw_state) {
        Ok(decoded) => decoded,
        Err(err) => return err.into_response(),
    };

    let client_type = classify::classify(&decoded.redirect_uri, &state.config);
    if !client_type.is_supported() {
        tracing::warn!(redirect_uri = %decoded.redirect_uri, "Unsupported client type in callback");
        return BrokerError::invalid_client("redirect URI matches no supported client convention")
            .into_response();
    }

    match decoded.broker_code {
        Some(ref broker_code) => {
            forward_brokered(&state, broker_code, &upstream_code, &decoded, client_type).await
        }
        None => direct_exchange(&state, &upstream_code, &decoded).await,
    }
}

/// Brokered flow: exchange upstream code, attach the grant, forward the
/// broker code to the client's own callback.
async fn forward_brokered(
    state: &AppState,
    broker_code: &str,
    upstream_code: &str,
    decoded: &EncodedState,
    client_type: ClientType,
) -> Response {
    let tokens = match state.upstream.exchange_code(upstream_code, None).await {
        Ok(tokens) => tokens,
        Err(err) => return err.into_response(),
    };

    let grant = UpstreamGrant { code: upstream_code.to_string(), tokens: Some(tokens) };
    if state.store.attach_upstream(broker_code, grant).await.is_none() {
        return BrokerError::invalid_grant("broker code is unknown or expired").into_response();
    }

    let Ok(mut url) = Url::parse(&decoded.redirect_uri) else {
        return BrokerError::invalid_client("client redirect URI is unparseable").into_response();
    };
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("code", broker_code);
        if let Some(ref original_state) = decoded.state {
            pairs.append_pair("state", original_state);
        }
    }

    tracing::info!(client_type = ?client_type, "Forwarding broker code to client callback");
    found(url.as_str())
}

/// Directly-tested flow: no broker code was minted, so the tokens go
/// straight back to the caller instead of into the store.
async fn direct_exchange(
    state: &AppState,
    upstream_code: &str,
    decoded: &EncodedState,
) -> Response {
    let tokens = match state
        .upstream
        .exchange_code(upstream_code, decoded.code_verifier.as_deref())
        .await
    {
        Ok(tokens) => tokens,
        Err(err) => return err.into_response(),
    };

    let response = TokenResponse::from_upstream(tokens, &state.config.default_scope);
    let mut body = serde_json::to_value(&response).unwrap_or_default();
    if let (Some(object), Some(original_state)) = (body.as_object_mut(), decoded.state.as_ref()) {
        object.insert("state".to_string(), serde_json::Value::String(original_state.clone()));
    }

    token_success(Json(body).into_response())
}

// ─── Token endpoint ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub code_verifier: Option<String>,
}

/// `POST /token`
///
/// Redeems a broker code. The code is taken out of the store before the
/// binding checks run, so any terminal outcome past the existence check
/// leaves it unusable — at most one redemption, ever.
pub async fn handle_token(
    State(state): State<Arc<AppState>>,
    axum::Form(form): axum::Form<TokenRequest>,
) -> Response {
    match redeem(&state, form).await {
        Ok(response) => token_success(Json(response).into_response()),
        Err(err) => {
            tracing::warn!(error = %err.error_code(), "Token exchange rejected");
            err.into_response()
        }
    }
}

async fn redeem(state: &AppState, form: TokenRequest) -> BrokerResult<TokenResponse> {
    if form.grant_type.as_deref() != Some("authorization_code") {
        return Err(BrokerError::UnsupportedGrantType);
    }

    let Some(code) = form.code else {
        return Err(BrokerError::invalid_request("code is required"));
    };
    let Some(redirect_uri) = form.redirect_uri else {
        return Err(BrokerError::invalid_request("redirect_uri is required"));
    };

    // Atomic take: not-found, expired, and already-used all collapse to the
    // same answer, and concurrent redemption attempts get exactly one winner.
    let Some(context) = state.store.consume(&code).await else {
        return Err(BrokerError::invalid_grant("authorization code is invalid or expired"));
    };

    if normalize_redirect_uri(&redirect_uri) != normalize_redirect_uri(&context.redirect_uri) {
        return Err(BrokerError::invalid_grant("redirect_uri does not match the authorized one"));
    }

    if let Some(ref client_id) = form.client_id {
        if *client_id != context.client_id {
            return Err(BrokerError::invalid_client("client_id does not match"));
        }
    }

    if let Some(ref challenge) = context.code_challenge {
        let Some(ref verifier) = form.code_verifier else {
            return Err(BrokerError::invalid_request("code_verifier is required"));
        };
        if !pkce::verify_s256(verifier, challenge) {
            return Err(BrokerError::invalid_grant("PKCE verification failed"));
        }
    }

    let Some(grant) = context.upstream else {
        return Err(BrokerError::invalid_grant("authorization flow was not completed"));
    };

    let tokens = match grant.tokens {
        Some(tokens) => tokens,
        // The callback recorded the upstream code without exchanging it;
        // do the exchange now, inside this request.
        None => state.upstream.exchange_code(&grant.code, None).await?,
    };

    tracing::info!(client_id = %context.client_id, "Broker code redeemed");

    Ok(TokenResponse::from_upstream(tokens, &context.scope))
}

/// Apply the cache headers required on token responses (RFC 6749 §5.1).
fn token_success(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

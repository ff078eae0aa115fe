//! Core data types for the authorization-code broker.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Tokens received from the upstream identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamTokens {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// The upstream side of a brokered authorization, attached to a
/// [`BrokerCode`] by the callback handler in a single mutation.
///
/// `tokens` is populated when the callback performed the exchange itself;
/// when absent, the token endpoint exchanges `code` synchronously.
#[derive(Debug, Clone)]
pub struct UpstreamGrant {
    /// Authorization code issued by the upstream provider.
    pub code: String,
    /// Tokens already exchanged for that code, if any.
    pub tokens: Option<UpstreamTokens>,
}

/// A broker-issued authorization code and its bound request context.
///
/// Owned exclusively by the code store. Single-use: consumed and removed
/// by the token endpoint, or removed on expiry.
#[derive(Debug, Clone)]
pub struct BrokerCode {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub resource: Option<String>,
    pub created_at: Instant,
    pub expires_at: Instant,
    pub upstream: Option<UpstreamGrant>,
}

impl BrokerCode {
    /// Check whether the code's expiry timestamp has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Token response returned to the originating client (RFC 6749 §5.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Build a client-facing token response from upstream tokens.
    #[must_use]
    pub fn from_upstream(tokens: UpstreamTokens, fallback_scope: &str) -> Self {
        let scope = tokens.scope.clone().or_else(|| Some(fallback_scope.to_string()));
        Self {
            access_token: tokens.access_token,
            token_type: "Bearer".to_string(),
            expires_in: tokens.expires_in,
            refresh_token: tokens.refresh_token,
            id_token: tokens.id_token,
            scope,
        }
    }
}

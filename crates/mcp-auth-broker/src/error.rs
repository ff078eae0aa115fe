//! Error types for the authorization-code broker.
//!
//! Uses `thiserror` for structured error handling; every variant maps to an
//! OAuth 2.1 error code and an HTTP status so handlers can render the
//! standard `{error, error_description}` body.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors raised by the broker endpoints.
#[derive(thiserror::Error, Debug)]
pub enum BrokerError {
    /// Malformed or missing request parameters.
    #[error("{0}")]
    InvalidRequest(String),

    /// `response_type` other than "code".
    #[error("response_type must be 'code'")]
    UnsupportedResponseType,

    /// `grant_type` other than "authorization_code".
    #[error("grant_type must be 'authorization_code'")]
    UnsupportedGrantType,

    /// Client identity or redirect URI not recognized.
    #[error("{0}")]
    InvalidClient(String),

    /// Code invalid, expired, already used, or PKCE mismatch.
    #[error("{0}")]
    InvalidGrant(String),

    /// Resource indicator outside this broker's origin.
    #[error("resource indicator does not match this server's origin")]
    InvalidTarget,

    /// State blob undecodable or of an unknown format.
    #[error("{0}")]
    InvalidState(String),

    /// The upstream provider denied authorization.
    #[error("upstream provider denied authorization: {0}")]
    AuthorizationFailed(String),

    /// Upstream transport or store failure.
    #[error("{0}")]
    ServerError(String),
}

impl BrokerError {
    /// Create an invalid-request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an invalid-client error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient(message.into())
    }

    /// Create an invalid-grant error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant(message.into())
    }

    /// Create an invalid-state error.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Create a server error.
    #[must_use]
    pub fn server(message: impl Into<String>) -> Self {
        Self::ServerError(message.into())
    }

    /// The OAuth 2.1 error code for this error.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::InvalidTarget => "invalid_target",
            Self::InvalidState(_) => "invalid_state",
            Self::AuthorizationFailed(_) => "access_denied",
            Self::ServerError(_) => "server_error",
        }
    }

    /// The HTTP status for a direct (non-redirect) error response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::UnsupportedResponseType
            | Self::UnsupportedGrantType
            | Self::InvalidGrant(_)
            | Self::InvalidTarget
            | Self::InvalidState(_) => StatusCode::BAD_REQUEST,
            Self::InvalidClient(_) => StatusCode::UNAUTHORIZED,
            Self::AuthorizationFailed(_) => StatusCode::FORBIDDEN,
            Self::ServerError(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.error_code(),
            "error_description": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

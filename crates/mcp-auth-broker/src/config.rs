//! Configuration for the authorization-code broker.

use std::time::Duration;

use anyhow::Context;

/// Broker defaults and protocol constants.
pub mod defaults {
    use std::time::Duration;

    /// Lifetime of a broker-issued authorization code: 10 minutes.
    pub const CODE_TTL: Duration = Duration::from_secs(600);

    /// Interval between sweeps of expired codes: 5 minutes.
    pub const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

    /// Timeout for the upstream token exchange.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection timeout for upstream calls.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Scope requested upstream when the client asks for none.
    pub const DEFAULT_SCOPE: &str = "openid email profile";

    /// Path of this broker's own upstream-facing callback.
    pub const CALLBACK_PATH: &str = "/callback";

    /// Upstream authorization endpoint (Google OAuth 2.0).
    pub const UPSTREAM_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

    /// Upstream token endpoint (Google OAuth 2.0).
    pub const UPSTREAM_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

    /// Loopback callback path suffixes accepted for dynamic-port clients.
    pub const LOOPBACK_CALLBACK_PATHS: &[&str] = &["/callback", "/oauth/callback"];

    /// Loopback ports pre-registered for fixed-port MCP clients.
    pub const LOOPBACK_FIXED_PORTS: &[u16] = &[6180, 6181, 6182, 6183, 6184, 6185];
}

/// Broker configuration.
///
/// The redirect-URI policy (fixed URIs, loopback paths, fixed ports) is
/// explicit configuration rather than a hidden default so the accepted
/// pattern set can be audited in one place.
#[derive(Debug, Clone)]
pub struct Config {
    /// Client id registered with the upstream identity provider.
    pub upstream_client_id: String,

    /// Client secret registered with the upstream identity provider.
    pub upstream_client_secret: String,

    /// Upstream authorization endpoint URL.
    pub upstream_authorize_url: String,

    /// Upstream token endpoint URL.
    pub upstream_token_url: String,

    /// Public origin of this broker (e.g. `https://broker.example.com`).
    pub base_url: String,

    /// Pre-registered non-loopback redirect URIs accepted exactly.
    pub fixed_redirect_uris: Vec<String>,

    /// Path suffixes accepted on loopback hosts with arbitrary ports.
    pub loopback_callback_paths: Vec<String>,

    /// Loopback ports treated as fixed-port clients.
    pub loopback_fixed_ports: Vec<u16>,

    /// Default scope forwarded upstream.
    pub default_scope: String,

    /// Lifetime of a broker-issued code.
    pub code_ttl: Duration,

    /// Upstream request timeout.
    pub request_timeout: Duration,

    /// Upstream connection timeout.
    pub connect_timeout: Duration,
}

impl Config {
    /// Create a configuration for the given upstream credentials and base URL.
    #[must_use]
    pub fn new(
        upstream_client_id: String,
        upstream_client_secret: String,
        base_url: String,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            upstream_client_id,
            upstream_client_secret,
            upstream_authorize_url: defaults::UPSTREAM_AUTHORIZE_URL.to_string(),
            upstream_token_url: defaults::UPSTREAM_TOKEN_URL.to_string(),
            fixed_redirect_uris: vec![format!("{base_url}{}", defaults::CALLBACK_PATH)],
            loopback_callback_paths: defaults::LOOPBACK_CALLBACK_PATHS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            loopback_fixed_ports: defaults::LOOPBACK_FIXED_PORTS.to_vec(),
            default_scope: defaults::DEFAULT_SCOPE.to_string(),
            code_ttl: defaults::CODE_TTL,
            request_timeout: defaults::REQUEST_TIMEOUT,
            connect_timeout: defaults::CONNECT_TIMEOUT,
            base_url,
        }
    }

    /// Create a test configuration pointing at a mock upstream server.
    #[must_use]
    pub fn for_testing(upstream_base_url: &str) -> Self {
        let mut config = Self::new(
            "test-client-id".to_string(),
            "test-client-secret".to_string(),
            "https://broker.example.com".to_string(),
        );
        config.upstream_authorize_url = format!("{upstream_base_url}/authorize");
        config.upstream_token_url = format!("{upstream_base_url}/token");
        config.request_timeout = Duration::from_secs(5);
        config.connect_timeout = Duration::from_secs(2);
        config
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `UPSTREAM_CLIENT_ID`, `UPSTREAM_CLIENT_SECRET`
    /// or `BROKER_BASE_URL` is missing.
    pub fn from_env() -> anyhow::Result<Self> {
        let client_id =
            std::env::var("UPSTREAM_CLIENT_ID").context("UPSTREAM_CLIENT_ID is not set")?;
        let client_secret =
            std::env::var("UPSTREAM_CLIENT_SECRET").context("UPSTREAM_CLIENT_SECRET is not set")?;
        let base_url = std::env::var("BROKER_BASE_URL").context("BROKER_BASE_URL is not set")?;

        let mut config = Self::new(client_id, client_secret, base_url);
        if let Ok(uris) = std::env::var("BROKER_REDIRECT_URIS") {
            config
                .fixed_redirect_uris
                .extend(uris.split(',').map(|u| u.trim().to_string()).filter(|u| !u.is_empty()));
        }
        Ok(config)
    }

    /// This broker's own fixed upstream-facing callback URI.
    ///
    /// Sent as `redirect_uri` on both legs of the upstream exchange;
    /// the two must match byte-for-byte.
    #[must_use]
    pub fn callback_uri(&self) -> String {
        format!("{}{}", self.base_url, defaults::CALLBACK_PATH)
    }
}

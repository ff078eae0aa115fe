//! Client for the upstream identity provider.
//!
//! Builds the upstream authorization URL and exchanges upstream codes for
//! tokens. The exchange has a bounded timeout and is never retried: an
//! authorization code is a single-use credential, and a blind retry could
//! double-spend it. Upstream response bodies are logged but never echoed
//! to untrusted redirect targets.

use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use url::Url;

use crate::broker::types::UpstreamTokens;
use crate::config::Config;
use crate::error::{BrokerError, BrokerResult};

/// HTTP client for the upstream provider's OAuth endpoints.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    client_id: String,
    client_secret: String,
    authorize_url: Url,
    token_url: String,
    /// The broker's own callback URI; identical on both upstream legs.
    callback_uri: String,
    request_timeout: Duration,
}

impl UpstreamClient {
    /// Create a new upstream client from the broker configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized or the
    /// configured authorization URL does not parse.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        let authorize_url = Url::parse(&config.upstream_authorize_url)
            .context("upstream authorization URL is not a valid URL")?;

        Ok(Self {
            client,
            client_id: config.upstream_client_id.clone(),
            client_secret: config.upstream_client_secret.clone(),
            authorize_url,
            token_url: config.upstream_token_url.clone(),
            callback_uri: config.callback_uri(),
            request_timeout: config.request_timeout,
        })
    }

    /// Build the upstream authorization URL for a brokered request.
    ///
    /// Always embeds the broker's own fixed callback URI, never the
    /// client's. `access_type=offline` and `prompt=consent` ask the
    /// provider for a refresh token on every pass.
    #[must_use]
    pub fn authorize_url(&self, scope: &str, encoded_state: &str) -> String {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.callback_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", scope)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", encoded_state);
        url.to_string()
    }

    /// Exchange an upstream authorization code for tokens.
    ///
    /// `code_verifier` is forwarded for directly-tested flows that ran
    /// PKCE against the upstream provider itself.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` on timeout, transport failure, or a non-2xx
    /// upstream response.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> BrokerResult<UpstreamTokens> {
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.callback_uri.as_str()),
        ];
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }

        tracing::debug!(token_url = %self.token_url, "Exchanging upstream authorization code");

        let response =
            self.client.post(&self.token_url).form(&params).send().await.map_err(|e| {
                if e.is_timeout() {
                    BrokerError::server(format!(
                        "upstream token exchange timed out after {:?}",
                        self.request_timeout
                    ))
                } else {
                    tracing::warn!(error = %e, "Upstream token exchange transport failure");
                    BrokerError::server("upstream token exchange failed")
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Upstream rejected token exchange");
            return Err(BrokerError::server("upstream rejected the token exchange"));
        }

        let tokens: UpstreamTokens = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "Upstream token response was not valid JSON");
            BrokerError::server("upstream returned an unreadable token response")
        })?;

        tracing::info!(
            has_id_token = tokens.id_token.is_some(),
            has_refresh_token = tokens.refresh_token.is_some(),
            "Upstream token exchange successful"
        );

        Ok(tokens)
    }
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_url_uses_broker_callback() {
        let config = Config::for_testing("http://upstream.localhost");
        let upstream = UpstreamClient::new(&config).unwrap();

        let url = upstream.authorize_url("openid email profile", "blob");
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> =
            parsed.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();

        assert!(pairs.contains(&("redirect_uri".into(), "https://broker.example.com/callback".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("state".into(), "blob".into())));
        assert!(pairs.contains(&("access_type".into(), "offline".into())));
    }
}

//! Client-type classification and redirect-URI matching.
//!
//! The broker serves several calling conventions that cannot share a
//! redirect-URI shape. Classification is a pure function over a declared
//! pattern table; shapes that match nothing classify as [`ClientType::Unsupported`]
//! and are rejected by the endpoints rather than guessed at.

use url::Url;

use crate::config::Config;

const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "[::1]"];

/// Calling convention inferred from a redirect URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    /// Loopback listener on one of the pre-registered fixed ports.
    LoopbackFixedPort,
    /// Loopback listener on an ephemeral port.
    LoopbackDynamicPort,
    /// Pre-registered non-loopback redirect (browser-based client).
    BrowserRedirect,
    /// No declared pattern matched.
    Unsupported,
}

impl ClientType {
    /// Whether the broker accepts this client type at all.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

fn is_loopback_host(host: &str) -> bool {
    LOOPBACK_HOSTS.contains(&host.to_ascii_lowercase().as_str())
}

/// Classify a redirect URI against the configured pattern table.
#[must_use]
pub fn classify(redirect_uri: &str, config: &Config) -> ClientType {
    let Ok(url) = Url::parse(redirect_uri) else {
        return ClientType::Unsupported;
    };
    let Some(host) = url.host_str() else {
        return ClientType::Unsupported;
    };

    if is_loopback_host(host) {
        if url.scheme() != "http" {
            return ClientType::Unsupported;
        }
        let path = url.path().trim_end_matches('/');
        let path_accepted =
            path.is_empty() || config.loopback_callback_paths.iter().any(|p| p == path);
        if !path_accepted {
            return ClientType::Unsupported;
        }
        let fixed_port =
            url.port().is_some_and(|p| config.loopback_fixed_ports.contains(&p));
        if fixed_port {
            ClientType::LoopbackFixedPort
        } else {
            ClientType::LoopbackDynamicPort
        }
    } else {
        let normalized = normalize_redirect_uri(redirect_uri);
        if config.fixed_redirect_uris.iter().any(|u| normalize_redirect_uri(u) == normalized) {
            ClientType::BrowserRedirect
        } else {
            ClientType::Unsupported
        }
    }
}

/// Whether the authorization endpoint accepts this redirect URI.
#[must_use]
pub fn redirect_uri_allowed(redirect_uri: &str, config: &Config) -> bool {
    classify(redirect_uri, config).is_supported()
}

/// Canonicalize a redirect URI for equality checks.
///
/// Collapses loopback-host aliasing (`127.0.0.1` and `[::1]` become
/// `localhost`), lowercases scheme and host, and drops a trailing slash.
/// Ports stay significant. Unparseable URIs are compared as-is.
#[must_use]
pub fn normalize_redirect_uri(redirect_uri: &str) -> String {
    let Ok(url) = Url::parse(redirect_uri) else {
        return redirect_uri.to_string();
    };
    let Some(host) = url.host_str() else {
        return redirect_uri.to_string();
    };

    let host = if is_loopback_host(host) {
        "localhost".to_string()
    } else {
        host.to_ascii_lowercase()
    };
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = url.path().trim_end_matches('/');
    let query = url.query().map(|q| format!("?{q}")).unwrap_or_default();

    format!("{}://{}{}{}{}", url.scheme(), host, port, path, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let mut config = Config::for_testing("http://upstream.localhost");
        config.fixed_redirect_uris.push("https://vscode.dev/redirect".to_string());
        config
    }

    #[test]
    fn test_loopback_dynamic_port() {
        let config = test_config();
        assert_eq!(
            classify("http://127.0.0.1:54321/callback", &config),
            ClientType::LoopbackDynamicPort
        );
        assert_eq!(
            classify("http://localhost:33000/oauth/callback", &config),
            ClientType::LoopbackDynamicPort
        );
        assert_eq!(classify("http://localhost:33000", &config), ClientType::LoopbackDynamicPort);
    }

    #[test]
    fn test_loopback_fixed_port() {
        let config = test_config();
        assert_eq!(
            classify("http://localhost:6180/oauth/callback", &config),
            ClientType::LoopbackFixedPort
        );
    }

    #[test]
    fn test_browser_redirect_requires_exact_registration() {
        let config = test_config();
        assert_eq!(classify("https://vscode.dev/redirect", &config), ClientType::BrowserRedirect);
        assert_eq!(classify("https://evil.example/cb", &config), ClientType::Unsupported);
    }

    #[test]
    fn test_loopback_with_unknown_path_is_unsupported() {
        let config = test_config();
        assert_eq!(classify("http://localhost:9000/steal", &config), ClientType::Unsupported);
    }

    #[test]
    fn test_https_loopback_is_unsupported() {
        let config = test_config();
        assert_eq!(classify("https://localhost:9000/callback", &config), ClientType::Unsupported);
    }

    #[test]
    fn test_unparseable_is_unsupported() {
        let config = test_config();
        assert_eq!(classify("not a uri", &config), ClientType::Unsupported);
    }

    #[test]
    fn test_normalize_loopback_aliasing() {
        assert_eq!(
            normalize_redirect_uri("http://127.0.0.1:5000/cb"),
            normalize_redirect_uri("http://localhost:5000/cb")
        );
    }

    #[test]
    fn test_normalize_trailing_slash() {
        assert_eq!(
            normalize_redirect_uri("http://localhost:5000/cb"),
            normalize_redirect_uri("http://localhost:5000/cb/")
        );
    }

    #[test]
    fn test_normalize_case() {
        assert_eq!(
            normalize_redirect_uri("HTTP://LOCALHOST:5000/cb"),
            normalize_redirect_uri("http://localhost:5000/cb")
        );
    }

    #[test]
    fn test_normalize_port_significant() {
        assert_ne!(
            normalize_redirect_uri("http://localhost:5000/cb"),
            normalize_redirect_uri("http://localhost:5001/cb")
        );
    }
}

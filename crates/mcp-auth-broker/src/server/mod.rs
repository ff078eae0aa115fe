//! HTTP server for the broker endpoints.

pub mod handlers;
pub mod metadata;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::broker::CodeStore;
use crate::config::Config;
use crate::upstream::UpstreamClient;

/// Shared state injected into every handler.
pub struct AppState {
    pub config: Config,
    pub store: Arc<CodeStore>,
    pub upstream: UpstreamClient,
}

/// Create the broker's HTTP router.
///
/// The code store is constructed here and owned by the router state; it is
/// the only shared mutable resource in the service.
#[must_use]
pub fn create_router(config: Config, upstream: UpstreamClient) -> Router {
    let store = Arc::new(CodeStore::new());
    Arc::clone(&store).start_sweep_task();

    let state = Arc::new(AppState { config, store, upstream });

    Router::new()
        .route("/health", get(metadata::handle_health))
        .route(
            "/.well-known/oauth-authorization-server",
            get(metadata::handle_auth_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(metadata::handle_protected_resource),
        )
        .route("/register", post(metadata::handle_register))
        .route("/authorize", get(handlers::handle_authorize))
        .route("/callback", get(handlers::handle_callback))
        .route("/token", post(handlers::handle_token))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The broker service.
pub struct BrokerServer {
    config: Config,
    upstream: UpstreamClient,
}

impl BrokerServer {
    /// Create a new broker server.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream HTTP client cannot be built.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let upstream = UpstreamClient::new(&config)?;
        Ok(Self { config, upstream })
    }

    /// Run the HTTP server until shutdown.
    ///
    /// # Errors
    ///
    /// Returns error on bind or serve failure.
    pub async fn run(self, port: u16) -> anyhow::Result<()> {
        let router = create_router(self.config, self.upstream);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        tracing::info!("Broker listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("Broker shut down");
        Ok(())
    }
}

impl std::fmt::Debug for BrokerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerServer").field("base_url", &self.config.base_url).finish()
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("Failed to install CTRL+C handler");
    tracing::info!("Received shutdown signal");
}

//! OAuth 2.1 Authorization-Code Broker
//!
//! Mediates authorization-code flows between a single upstream identity
//! provider and heterogeneous MCP client conventions (loopback listeners
//! on dynamic or fixed ports, browser-redirect clients) that cannot share
//! one redirect URI. The upstream provider only accepts pre-registered
//! redirect URIs, so the broker issues its own short-lived codes bound to
//! each client's request context, performs the upstream exchange on the
//! client's behalf, and translates the result back into whichever delivery
//! convention the originating client expects.
//!
//! # Example
//!
//! ```no_run
//! use mcp_auth_broker::{config::Config, server::BrokerServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     BrokerServer::new(config)?.run(8000).await
//! }
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod server;
pub mod upstream;

pub use broker::{ClientType, CodeStore, EncodedState};
pub use config::Config;
pub use error::{BrokerError, BrokerResult};
pub use server::BrokerServer;

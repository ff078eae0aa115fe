//! OAuth 2.1 Authorization-Code Broker - Entry Point

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mcp_auth_broker::{config::Config, server::BrokerServer};

#[derive(Parser, Debug)]
#[command(name = "mcp-auth-broker")]
#[command(about = "OAuth 2.1 authorization-code broker for MCP clients")]
#[command(version)]
struct Cli {
    /// HTTP server port
    #[arg(long, default_value = "8000", env = "PORT")]
    port: u16,

    /// Public base URL of this broker (e.g., https://broker.example.com)
    #[arg(long, env = "BROKER_BASE_URL")]
    base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    let mut config = Config::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url.trim_end_matches('/').to_string();
        // The broker's own callback follows the base URL.
        let callback = config.callback_uri();
        if !config.fixed_redirect_uris.contains(&callback) {
            config.fixed_redirect_uris.push(callback);
        }
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.base_url,
        "Starting authorization-code broker"
    );

    BrokerServer::new(config)?.run(cli.port).await
}

//! Ultraviolet Relay - Main entry point

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use ultraviolet_relay::config::{parse_origin_list, DEFAULT_BASE_PATH, DEFAULT_USER_AGENT};
use ultraviolet_relay::{ProxyServer, RelayConfig};

/// Ultraviolet Relay - fetch, rewrite and relay web pages
#[derive(Parser, Debug)]
#[command(name = "ultraviolet-relay")]
#[command(author = "Ultraviolet Relay Contributors")]
#[command(version)]
#[command(about = "An HTTP(S) forwarding relay with HTML link rewriting")]
struct Args {
    /// HTTP port to listen on
    #[arg(long, env = "HTTP_PORT", default_value = "8080")]
    http_port: u16,

    /// Path the relay is served on
    #[arg(long, env = "RELAY_BASE_PATH", default_value = DEFAULT_BASE_PATH)]
    base_path: String,

    /// User-Agent sent to upstream servers
    #[arg(long, env = "RELAY_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Comma separated CORS origin allow-list (empty allows any origin)
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = "")]
    allowed_origins: String,

    /// Upstream request timeout in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value = "30")]
    upstream_timeout_secs: u64,

    /// Maximum number of upstream redirects to follow
    #[arg(long, env = "MAX_REDIRECTS", default_value = "10")]
    max_redirects: usize,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG takes precedence for per-crate filtering
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Ultraviolet Relay v{}", env!("CARGO_PKG_VERSION"));

    let base_path = if args.base_path.starts_with('/') {
        args.base_path
    } else {
        format!("/{}", args.base_path)
    };

    let config = RelayConfig {
        http_port: args.http_port,
        base_path,
        user_agent: args.user_agent,
        allowed_origins: parse_origin_list(&args.allowed_origins),
        upstream_timeout: Duration::from_secs(args.upstream_timeout_secs),
        max_redirects: args.max_redirects,
    };

    if config.allowed_origins.is_empty() {
        info!("CORS: any origin");
    } else {
        info!("CORS allow-list: {}", config.allowed_origins.join(", "));
    }

    let server = Arc::new(ProxyServer::new(config)?);

    server.run().await?;

    Ok(())
}

//! pricecatcher-mcp: MCP server for Malaysian retail price tools
//!
//! Serves price search, comparison, trend and market insight tools over
//! stdio (default) or HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use pricecatcher_mcp::config::{self, Config, ProviderKind};
use pricecatcher_mcp::error::ProviderError;
use pricecatcher_mcp::mcp::server::{McpServer, MessageHandler};
use pricecatcher_mcp::mcp::{http, StdioTransport};
use pricecatcher_mcp::pricing::{HttpProvider, PriceProvider, SampleProvider};
use pricecatcher_mcp::ratelimit::RateLimiter;
use pricecatcher_mcp::tools::{ToolExecutor, ToolRegistry};

/// MCP server for Malaysian retail price tools.
///
/// Exposes price search, cross-region comparison, trend summaries and market
/// insights to AI assistants over the Model Context Protocol.
#[derive(Parser, Debug)]
#[command(name = "pricecatcher-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Serve over HTTP instead of stdio, optionally on the given address
    #[arg(long, value_name = "ADDR", num_args = 0..=1)]
    http: Option<Option<SocketAddr>>,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the configured price provider.
fn build_provider(cfg: &Config) -> Result<Arc<dyn PriceProvider>, ProviderError> {
    match cfg.provider.kind {
        ProviderKind::Sample => Ok(Arc::new(SampleProvider::new())),
        ProviderKind::Http => {
            // validate() guarantees a base URL for the HTTP provider
            let base_url = cfg.provider.base_url.as_deref().unwrap_or_default();
            let provider = HttpProvider::new(base_url, cfg.provider.timeout())?;
            info!(endpoint = provider.endpoint(), "Using upstream price service");
            Ok(Arc::new(provider))
        }
    }
}

/// Resolves when the process is asked to stop.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut sigint), Ok(mut sigterm)) = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) else {
        error!("Failed to install signal handlers");
        return std::future::pending().await;
    };

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

/// Resolves when the process is asked to stop.
#[cfg(windows)]
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, initiating graceful shutdown");
    } else {
        error!("Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

/// Entry point for the pricecatcher-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                    eprintln!("Create one based on config/example-config.json");
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting pricecatcher-mcp server"
    );

    let provider = match build_provider(&cfg) {
        Ok(provider) => provider,
        Err(e) => {
            error!(error = %e, "Failed to set up price provider");
            return ExitCode::FAILURE;
        }
    };

    info!(
        provider = provider.name(),
        per_minute = cfg.rate_limit.per_minute,
        per_hour = cfg.rate_limit.per_hour,
        "Price tools configured"
    );

    let limiter = Arc::new(RateLimiter::new(cfg.rate_limit.clone()));
    let executor = ToolExecutor::new(provider, limiter, cfg.provider.timeout());
    let handler: Arc<dyn MessageHandler> = Arc::new(McpServer::new(ToolRegistry::builtin(), executor));

    // Run the server
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    let result = match args.http {
        Some(addr) => {
            if let Some(addr) = addr {
                cfg.http.bind = addr;
            }
            runtime.block_on(http::serve(
                cfg.http.bind,
                handler,
                cfg.http.heartbeat(),
                shutdown_signal(),
            ))
        }
        None => {
            info!("MCP server ready on stdio, waiting for client connection...");
            runtime.block_on(StdioTransport::stdio().run(handler, shutdown_signal()))
        }
    };

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn http_flag_takes_optional_address() {
        let args = Args::try_parse_from(["pricecatcher-mcp"]).unwrap();
        assert_eq!(args.http, None);

        let args = Args::try_parse_from(["pricecatcher-mcp", "--http"]).unwrap();
        assert_eq!(args.http, Some(None));

        let args = Args::try_parse_from(["pricecatcher-mcp", "--http", "0.0.0.0:9000"]).unwrap();
        assert_eq!(args.http, Some(Some("0.0.0.0:9000".parse().unwrap())));
    }

    #[test]
    fn log_level_precedence() {
        assert_eq!(get_log_level(0, true, "debug"), Level::ERROR);
        assert_eq!(get_log_level(0, false, "debug"), Level::DEBUG);
        assert_eq!(get_log_level(2, false, "error"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "loud"), Level::WARN);
    }

    #[test]
    fn sample_provider_is_default() {
        let provider = build_provider(&Config::default()).unwrap();
        assert_eq!(provider.name(), "sample");
    }
}

//! agent-bridge entry point
//!
//! Wires the breaker, pool, gateway, and limiter together at the
//! composition root and serves the HTTP boundary until ctrl-c.

use agent_bridge::breaker::CircuitBreaker;
use agent_bridge::broker::{BrokerGateway, TcpBrokerTransport};
use agent_bridge::config::BridgeConfig;
use agent_bridge::limiter::RateLimiter;
use agent_bridge::observability::init_default_logging;
use agent_bridge::pool::{RetryPolicy, WorkerPool};
use agent_bridge::server::{routes, AppState};
use clap::{Parser, Subcommand};
use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "agent-bridge")]
#[command(about = "Resilient HTTP-to-broker gateway for the agent-ai backend")]
#[command(version)]
struct Cli {
    /// Configuration file path (TOML); environment variables override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway
    Run,
    /// Validate configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();
    info!("Starting agent-bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_gateway(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {e}");
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(BridgeConfig::load_from_file(path)?)
        }
        None => {
            let default_path = PathBuf::from("bridge.toml");
            if default_path.exists() {
                info!("Loading configuration from: {}", default_path.display());
                return Ok(BridgeConfig::load_from_file(&default_path)?);
            }
            Ok(BridgeConfig::from_env()?)
        }
    }
}

async fn run_gateway(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let breaker = Arc::new(CircuitBreaker::from_config(&config.breaker));
    let pool = Arc::new(WorkerPool::new(
        config.pool.effective_workers(),
        config.pool.effective_queue_capacity(),
        RetryPolicy::from_config(&config.pool),
        breaker,
    ));
    let transport = Arc::new(TcpBrokerTransport::from_config(&config.broker)?);
    let gateway = Arc::new(BrokerGateway::new(
        transport,
        pool.clone(),
        &config.limits,
    ));
    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));

    let state = Arc::new(AppState {
        gateway,
        limiter,
        max_message_size: config.limits.max_message_size,
    });

    let bind_addr = (config.http.host.as_str(), config.http.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| format!("cannot resolve {}:{}", config.http.host, config.http.port))?;

    info!(broker = %config.broker.address, "Gateway started at http://{bind_addr}");

    let (_addr, serving) =
        warp::serve(routes(state)).try_bind_with_graceful_shutdown(bind_addr, async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutdown signal received");
        })?;
    serving.await;

    // Stop accepting first, then fail drained tasks and join workers.
    pool.shutdown().await;
    Ok(())
}

fn handle_config_command(
    config: BridgeConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    info!("Configuration is valid");
    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}

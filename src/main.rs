use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::{LoggingConfig, TurnstileConfig};
use turnstile::gate::RequestGate;
use turnstile::ratelimit::{CleanupSweeper, RateLimiter};
use turnstile::sidecar::{GateService, LineServer};

/// Fixed-window rate limiting sidecar.
///
/// Reads one JSON request per line on stdin and writes one JSON response per
/// line on stdout. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Default log filter (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logging is configured by the loaded settings, so it starts after `load`.
    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.logging.json |= args.log_json;

    init_tracing(&config.logging);

    info!("Starting Turnstile rate limiting sidecar");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let policies = Arc::new(config.policy_table());
    info!(
        path = ?args.config,
        policies = ?policies.names().collect::<Vec<_>>(),
        "Configuration loaded"
    );

    let limiter = Arc::new(RateLimiter::from_config(&config.limiter));
    info!(
        eviction_threshold = ?config.limiter.eviction_threshold,
        "Rate limiter initialized"
    );

    let sweeper = CleanupSweeper::spawn(limiter.clone(), config.limiter.cleanup_interval())?;

    let gate = RequestGate::new(limiter, policies);
    let server = LineServer::new(GateService::new(gate));

    // Run the server with graceful shutdown on Ctrl+C, SIGTERM or end of input
    server
        .serve_with_shutdown(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            shutdown_signal(),
        )
        .await?;

    sweeper.shutdown().await;

    info!("Turnstile rate limiting sidecar stopped");
    Ok(())
}

/// Install the global subscriber. Output goes to stderr; stdout carries responses.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

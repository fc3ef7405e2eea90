//! dhkx client binary.
//!
//! # Usage
//!
//! ```bash
//! # Default configuration locations
//! dhkx-client
//!
//! # Explicit configuration, one cycle, verbose
//! dhkx-client --config ./client.json --once --log-level debug
//! ```
//!
//! Exits non-zero when interrupted by a signal or stopped by a fatal error.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use dhkx_client::{ClientOptions, Exit};
use dhkx_core::CycleOutcome;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Diffie-Hellman key-exchange client
#[derive(Parser, Debug)]
#[command(name = "dhkx-client")]
#[command(about = "Exchanges Diffie-Hellman keys with a peer and sends encrypted messages")]
#[command(version)]
struct Args {
    /// Configuration document (JSON)
    #[arg(short, long, default_value = "/config/config-adapter.json")]
    config: PathBuf,

    /// Configuration used when the primary one cannot be read
    #[arg(long, default_value = "./config-server.json")]
    fallback_config: PathBuf,

    /// Run one exchange cycle and exit
    #[arg(long)]
    once: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("dhkx client starting");

    let options = ClientOptions {
        config_path: args.config,
        fallback_path: Some(args.fallback_config),
        once: args.once,
    };

    match dhkx_client::run(&options, shutdown_signal()).await {
        Ok(Exit::Completed(CycleOutcome::Delivered)) => ExitCode::SUCCESS,
        Ok(Exit::Completed(outcome)) => {
            tracing::error!("Cycle did not deliver: {outcome:?}");
            ExitCode::FAILURE
        },
        Ok(Exit::Interrupted) => {
            tracing::info!("Interrupted, exiting");
            ExitCode::FAILURE
        },
        Err(err) => {
            tracing::error!("Stopped: {err}");
            ExitCode::FAILURE
        },
    }
}

/// Completes on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl-C"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}

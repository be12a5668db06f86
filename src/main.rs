//! loglined: a newline-framed TCP append-and-replay log server
//!
//! Clients send arbitrary bytes; each `\n`-terminated packet is appended to a
//! persistent store file, and the store's full contents are streamed back to
//! the client after every completed packet. The store file doubles as the
//! assembly buffer for the in-progress packet, so packet size is bounded by
//! disk space rather than memory.
//!
//! Features:
//! - One connection serviced at a time; further clients queue in the backlog
//! - SIGINT/SIGTERM trigger graceful shutdown: sockets closed, store removed
//! - Configuration via CLI arguments or TOML file

mod config;
mod protocol;
mod server;
mod shutdown;
mod storage;

use config::Config;
use server::Server;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        store = %config.store_path.display(),
        backlog = config.backlog,
        "Starting loglined server"
    );

    let (trigger, shutdown) = shutdown::channel();
    if let Err(e) = shutdown::install(trigger) {
        error!(error = %e, "Failed to install signal handlers");
        return ExitCode::FAILURE;
    }

    let server = match Server::bind(&config).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to start server");
            return ExitCode::FAILURE;
        }
    };

    info!("Waiting for connections");

    match server.run(shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal I/O error, exiting");
            ExitCode::FAILURE
        }
    }
}

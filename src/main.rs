//! telnet-test-server: an interactive Telnet-style TCP test server
//!
//! Every client gets a welcome banner, then a status line pushed once per
//! interval. Clients may type commands at any time:
//! - `hello`: greeting
//! - `time`: current server time
//! - `exit`: farewell, then the connection closes
//!
//! Features:
//! - One independent session task per connection
//! - Graceful shutdown on Ctrl-C with a bounded grace period
//! - Configuration via CLI arguments or TOML file
//!
//! Killing the process without Ctrl-C skips the graceful path; open client
//! sockets are then closed by the operating system.

mod clock;
mod command;
mod config;
mod message;
mod server;
mod session;

use config::Config;
use server::Server;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        interval_ms = config.session.interval.as_millis() as u64,
        backlog = config.backlog,
        max_connections = config.max_connections,
        "Starting telnet-test-server"
    );

    let server = Server::bind(config).await?;
    if let Ok(addr) = server.local_addr() {
        info!("Connect with: telnet {} {}", addr.ip(), addr.port());
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(wait_for_ctrl_c(tokio::signal::ctrl_c(), signal));

    server.run(shutdown).await?;
    Ok(())
}

/// Cancel `shutdown` once `signal` reports Ctrl-C.
///
/// If the handler cannot be installed the server keeps running.
async fn wait_for_ctrl_c<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received Ctrl-C, shutting down");
            shutdown.cancel();
        }
        Err(e) => error!(error = %e, "Failed to listen for Ctrl-C, graceful shutdown unavailable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ctrl_c_cancels_shutdown() {
        let token = CancellationToken::new();
        wait_for_ctrl_c(async { Ok(()) }, token.clone()).await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_failed_handler_keeps_running() {
        let token = CancellationToken::new();
        let failing = async { Err(std::io::Error::other("no signal support")) };
        wait_for_ctrl_c(failing, token.clone()).await;
        assert!(!token.is_cancelled());
    }
}

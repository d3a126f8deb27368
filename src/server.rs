//! TCP server for the telnet test sessions.
//!
//! Binds the listener, accepts connections and runs one session task per
//! client. Sessions share nothing; the server only keeps a cancellation
//! token and a join handle for each so shutdown can close them.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::session::{Disconnect, Session};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Server instance
pub struct Server {
    config: Config,
    listener: TcpListener,
    clock: Arc<dyn Clock>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Bind the listening socket described by `config`.
    pub async fn bind(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let addr = config.listen_addr()?;
        let listener = create_listener(addr, config.backlog)?;
        let listener = TcpListener::from_std(listener)?;
        let connection_limit = Arc::new(Semaphore::new(config.max_connections));

        Ok(Server {
            config,
            listener,
            clock: Arc::new(SystemClock),
            connection_limit,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` fires, then close every session.
    pub async fn run(self, shutdown: CancellationToken) -> io::Result<()> {
        info!(address = %self.local_addr()?, "Server listening");

        let mut sessions: JoinSet<()> = JoinSet::new();

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&self.connection_limit).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(_) = sessions.join_next(), if !sessions.is_empty() => continue,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                    }

                    let session = Session::new(
                        stream,
                        peer,
                        self.config.session.clone(),
                        Arc::clone(&self.clock),
                    );
                    let token = shutdown.child_token();

                    sessions.spawn(async move {
                        let reason = session.run(token).await;
                        log_disconnect(peer, &reason);
                        drop(permit);
                    });
                    info!(peer = %peer, sessions = sessions.len(), "New connection");
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }

        info!(sessions = sessions.len(), "Shutting down, closing sessions");
        drop(self.listener);
        drain(sessions, self.config.shutdown_grace).await;
        info!("Server stopped");
        Ok(())
    }
}

/// Wait for sessions to finish, then abort the stragglers.
async fn drain(mut sessions: JoinSet<()>, grace: std::time::Duration) {
    let wait_all = async { while sessions.join_next().await.is_some() {} };
    if tokio::time::timeout(grace, wait_all).await.is_err() {
        warn!(
            remaining = sessions.len(),
            "Sessions did not close within grace period, aborting"
        );
        sessions.shutdown().await;
    }
}

fn log_disconnect(peer: SocketAddr, reason: &Disconnect) {
    if reason.is_normal() {
        info!(peer = %peer, reason = %reason, "Connection closed");
    } else {
        warn!(peer = %peer, reason = %reason, "Connection failed");
    }
}

/// Create a TCP listener with SO_REUSEADDR so restarts can rebind at once.
fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}

//! TCP server: accept loop and per-connection packet handling.
//!
//! Connections are serviced strictly one at a time; further clients wait in
//! the kernel backlog. Each read chunk is framed into packets, every chunk is
//! appended to the store, and each completed packet triggers a full replay of
//! the store back to the client.

use crate::config::Config;
use crate::protocol::{self, Segment};
use crate::shutdown::Shutdown;
use crate::storage::AppendStore;
use bytes::BytesMut;
use socket2::{Domain, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{info, trace, warn};

/// Fixed size of one network read chunk. A protocol-independent constant;
/// packets larger than this are assembled in the store file.
const CHUNK_SIZE: usize = 1024;

/// Delay before retrying after a transient accept failure.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How servicing of one connection ended.
#[derive(Debug, PartialEq, Eq)]
enum ConnectionEnd {
    /// Peer closed the stream in an orderly way.
    Disconnected,
    /// Shutdown was requested while the connection was mid-flight.
    Shutdown,
}

/// Server instance owning the listening socket and the append store.
pub struct Server {
    listener: TcpListener,
    store: AppendStore,
}

impl Server {
    /// Bind the listening socket and create the append store.
    ///
    /// Failure here is a fatal setup error; whatever was already opened is
    /// released when the partially built server drops.
    pub async fn bind(config: &Config) -> io::Result<Server> {
        let addr: SocketAddr = config.listen.parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid listen address '{}': {}", config.listen, e),
            )
        })?;

        let listener = bind_listener(addr, config.backlog)?;
        let store = AppendStore::open(&config.store_path).await?;

        info!(address = %listener.local_addr()?, "Server listening");
        Ok(Server { listener, store })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop until shutdown is requested or a fatal I/O error
    /// occurs, then tear everything down.
    ///
    /// `Ok(())` is a clean, signal-triggered exit; `Err` carries the fatal
    /// error. Teardown runs on both paths: the store handle is closed and its
    /// file unlinked, and the listener and any live connection socket close
    /// when the server drops.
    pub async fn run(mut self, mut shutdown: Shutdown) -> io::Result<()> {
        let result = self.accept_loop(&mut shutdown).await;
        self.store.destroy();
        result
    }

    async fn accept_loop(&mut self, shutdown: &mut Shutdown) -> io::Result<()> {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                res = self.listener.accept() => res,
            };

            match accepted {
                Ok((mut stream, peer)) => {
                    info!("Accepted connection from {}", peer.ip());
                    match handle_connection(&mut stream, &mut self.store, shutdown).await? {
                        ConnectionEnd::Disconnected => {
                            info!("Closed connection from {}", peer.ip());
                        }
                        ConnectionEnd::Shutdown => return Ok(()),
                    }
                }
                Err(e) => {
                    // Transient: log, pause, keep accepting.
                    warn!(error = %e, "Failed to accept connection, retrying");
                    tokio::select! {
                        _ = shutdown.recv() => return Ok(()),
                        _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                    }
                }
            }
        }
    }
}

/// Build the listening socket with `SO_REUSEADDR` and the configured backlog.
fn bind_listener(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog as i32)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}

/// Service one connection until the peer disconnects, shutdown is requested,
/// or an I/O error occurs.
///
/// Every chunk read from the peer is appended to the store as-is; when a
/// chunk completes one or more packets, the full store is replayed to the
/// peer after each. Any receive or store error is fatal and propagates.
async fn handle_connection<S>(
    stream: &mut S,
    store: &mut AppendStore,
    shutdown: &mut Shutdown,
) -> io::Result<ConnectionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(CHUNK_SIZE);

    loop {
        buf.clear();
        let n = tokio::select! {
            _ = shutdown.recv() => return Ok(ConnectionEnd::Shutdown),
            res = stream.read_buf(&mut buf) => res?,
        };
        if n == 0 {
            return Ok(ConnectionEnd::Disconnected);
        }
        trace!(bytes = n, "Read chunk");

        for segment in protocol::segments(&buf) {
            store.append(segment.bytes()).await?;
            if matches!(segment, Segment::Packet(_)) {
                store.replay(stream).await?;
            }
        }
    }
}

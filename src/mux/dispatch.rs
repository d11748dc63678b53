//! Connection dispatch: peek, classify, dial, relay.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::matcher::MatcherRegistry;
use super::peek::peek_initial;
use crate::error::MuxError;

/// Drives one accepted connection from peek to relay teardown.
///
/// The registry is the only state shared across connections and is
/// read-only after startup, so a plain `Arc` is enough.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<MatcherRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over a finished registry.
    pub fn new(registry: Arc<MatcherRegistry>) -> Self {
        Self { registry }
    }

    /// Handle one accepted connection to completion.
    ///
    /// Peeks the head of the stream, resolves a backend through the
    /// registry, dials it, and relays both directions until they
    /// finish. The client socket is owned here and closed on every
    /// exit path when it drops; the backend socket, once dialed, is
    /// closed when the relay finishes. No step is retried.
    pub async fn dispatch(
        &self,
        mut client: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), MuxError> {
        let segment = peek_initial(&client).await.map_err(|e| {
            warn!(peer = %peer_addr, error = %e, "Peek failed");
            MuxError::Peek(e)
        })?;

        debug!(
            peer = %peer_addr,
            peeked = segment.len(),
            ancillary = segment.ancillary_len(),
            "Peeked connection head"
        );

        let backend = match self.registry.resolve(segment.bytes()) {
            Some(backend) => backend,
            None => {
                debug!(peer = %peer_addr, "Protocol not recognized");
                return Err(MuxError::ProtocolNotRecognized);
            }
        };

        let addr = backend.addr();
        let mut upstream = match TcpStream::connect(&addr).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(peer = %peer_addr, backend = %addr, error = %e, "Backend dial failed");
                return Err(MuxError::Dial { addr, source: e });
            }
        };

        debug!(peer = %peer_addr, backend = %addr, "Relaying");

        let (bytes_to_backend, bytes_from_backend) =
            relay_bidirectional(&mut client, &mut upstream).await?;

        debug!(
            peer = %peer_addr,
            backend = %addr,
            bytes_to_backend = bytes_to_backend,
            bytes_from_backend = bytes_from_backend,
            "Connection closed"
        );

        Ok(())
    }
}

/// Relay bytes in both directions until each source is exhausted.
///
/// The two copy directions run concurrently and are joined before
/// returning, so both sockets are released exactly once whichever
/// direction finishes first. Each direction shuts down its write half
/// on EOF so the far side observes the close.
///
/// Returns (bytes client→backend, bytes backend→client).
async fn relay_bidirectional(
    client: &mut TcpStream,
    backend: &mut TcpStream,
) -> io::Result<(u64, u64)> {
    let (mut client_read, mut client_write) = client.split();
    let (mut backend_read, mut backend_write) = backend.split();

    let client_to_backend = async {
        let mut total = 0u64;
        let mut buf = vec![0u8; 8192];
        loop {
            match client_read.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    backend_write.write_all(&buf[..n]).await?;
                    total += n as u64;
                }
                Err(e) => return Err(e),
            }
        }
        backend_write.shutdown().await?;
        Ok(total)
    };

    let backend_to_client = async {
        let mut total = 0u64;
        let mut buf = vec![0u8; 8192];
        loop {
            match backend_read.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    client_write.write_all(&buf[..n]).await?;
                    total += n as u64;
                }
                Err(e) => return Err(e),
            }
        }
        client_write.shutdown().await?;
        Ok(total)
    };

    let (to_backend, from_backend) = tokio::join!(client_to_backend, backend_to_client);

    // Report bytes moved even if one direction errored
    Ok((to_backend.unwrap_or(0), from_backend.unwrap_or(0)))
}

//! TCP listeners and the accept loop.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, error, info, Instrument};

use super::dispatch::Dispatcher;
use crate::config::HostPort;

/// Where a listening socket comes from.
///
/// Bound and inherited sources are mutually exclusive for a run: when
/// the supervisor passed sockets in, configured listen specs are not
/// bound at all.
pub enum ListenerSource {
    /// Bind a fresh socket from a listen spec.
    Bound(HostPort),
    /// Adopt a socket pre-opened by the process supervisor.
    Inherited(std::net::TcpListener),
}

/// A listening socket driving one accept loop.
///
/// The listener owns its socket for the process lifetime and never
/// closes it.
pub struct Listener {
    listener: TcpListener,
    dispatcher: Dispatcher,
}

impl Listener {
    /// Open a listener from a source.
    ///
    /// `localhost` listen specs bind the wildcard address (see
    /// [`HostPort::listen_addr`]).
    pub async fn open(source: ListenerSource, dispatcher: Dispatcher) -> io::Result<Self> {
        let listener = match source {
            ListenerSource::Bound(spec) => TcpListener::bind(spec.listen_addr()).await?,
            ListenerSource::Inherited(std_listener) => {
                std_listener.set_nonblocking(true)?;
                TcpListener::from_std(std_listener)?
            }
        };

        info!(local_addr = %listener.local_addr()?, "Listener ready");

        Ok(Self {
            listener,
            dispatcher,
        })
    }

    /// The local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, dispatching each on its own task.
    ///
    /// An accept error never ends the loop, and a slow or stalled
    /// connection never blocks acceptance of subsequent ones.
    pub async fn run(self) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!(local_addr = %local_addr, "Accept loop started");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let dispatcher = self.dispatcher.clone();
                    tokio::spawn(
                        async move {
                            if let Err(e) = dispatcher.dispatch(stream, peer_addr).await {
                                debug!(peer = %peer_addr, error = %e, "Connection dropped");
                            }
                        }
                        .instrument(tracing::info_span!("connection", peer = %peer_addr)),
                    );
                }
                Err(e) => {
                    error!(local_addr = %local_addr, error = %e, "Accept failed");
                    // Brief sleep to avoid a tight loop on persistent errors
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

//! portmuxd
//!
//! Protocol-detecting TCP connection multiplexer.
//!
//! This service:
//! - Accepts TCP connections on configured or inherited listeners
//! - Peeks each connection's first bytes without consuming them
//! - Classifies the protocol with an ordered matcher registry
//! - Relays the full duplex stream to the matched backend

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use portmux::activation;
use portmux::cli;
use portmux::mux::{Dispatcher, Listener, ListenerSource};

#[tokio::main]
async fn main() -> Result<()> {
    let invocation = cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        matcher_count = invocation.registry.len(),
        listen_count = invocation.listen_specs.len(),
        "Starting portmuxd"
    );

    let dispatcher = Dispatcher::new(Arc::new(invocation.registry));

    let inherited = activation::inherited_listeners()?;

    let sources: Vec<ListenerSource> = if !inherited.is_empty() {
        // Supervisor-supplied sockets win; configured listen specs are
        // not bound for this run.
        inherited
            .into_iter()
            .map(ListenerSource::Inherited)
            .collect()
    } else {
        if invocation.listen_specs.is_empty() {
            println!("no listen port(s) specified and no sockets were inherited from the supervisor");
            std::process::exit(1);
        }
        invocation
            .listen_specs
            .into_iter()
            .map(ListenerSource::Bound)
            .collect()
    };

    let mut handles = Vec::new();
    for source in sources {
        let listener = Listener::open(source, dispatcher.clone()).await?;
        handles.push(tokio::spawn(async move {
            if let Err(e) = listener.run().await {
                error!(error = %e, "Listener failed");
            }
        }));
    }

    // The accept loops run until the process is externally terminated.
    for handle in handles {
        handle.await?;
    }

    Ok(())
}

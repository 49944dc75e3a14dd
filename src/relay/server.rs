/// Relay server: shared state and the listener loop.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use super::config::Config;
use super::registry::Registry;
use super::session;

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Process-wide relay state, handed to every connection task.
#[derive(Debug)]
pub struct ServerState {
    pub config: Config,
    pub registry: Registry,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        let registry = Registry::new(&config);
        Self { config, registry }
    }
}

/// Shared, thread-safe server state.
pub type SharedState = Arc<ServerState>;

/// Run the relay on every address in `config.bind`.
///
/// All listeners are bound before any connection is accepted, so a port
/// conflict fails fast. Bind failure is the only error that ends the process.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut listeners = Vec::with_capacity(config.bind.len());
    for addr in &config.bind {
        let listener = TcpListener::bind(addr).await?;
        info!("cove listening on {addr}");
        listeners.push(listener);
    }

    info!(
        catalog = ?config.catalog,
        default_room = %config.default_room,
        entry = ?config.entry,
        leave = ?config.leave,
        announce = ?config.announce,
        "relay configured"
    );
    let state: SharedState = Arc::new(ServerState::new(config));

    let mut handles = Vec::new();
    for listener in listeners {
        handles.push(tokio::spawn(accept_loop(listener, Arc::clone(&state))));
    }

    for handle in handles {
        handle.await?;
    }

    Ok(())
}

/// Accept connections on one listener, one session task per connection.
///
/// Accept errors are logged and the loop keeps going.
pub async fn accept_loop(listener: TcpListener, state: SharedState) {
    loop {
        match listener.accept().await {
            Ok((socket, addr)) => spawn_session(socket, addr, Arc::clone(&state)),
            Err(e) => {
                warn!("accept error: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

fn spawn_session(socket: TcpStream, addr: SocketAddr, state: SharedState) {
    info!(%addr, "new connection");
    tokio::spawn(async move {
        if let Err(e) = session::handle_client(socket, addr, Arc::clone(&state)).await {
            warn!(%addr, "client error: {e}");
        }
        let connections = state.registry.connection_count().await;
        info!(%addr, connections, "disconnected");
    });
}

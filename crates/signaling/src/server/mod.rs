//! WebSocket signaling server
//!
//! Owns the accept loop, the per-connection handler tasks and the periodic
//! liveness sweep. The listener is TLS when the configured certificate and
//! key load; otherwise it logs the problem and serves plaintext rather than
//! aborting startup.

pub mod handler;
pub mod heartbeat;

pub use handler::SharedState;

use crate::config::SignalingConfig;
use crate::error::Result;
use crate::registry::RegistrySnapshot;
use crate::tls;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// WebSocket signaling server
pub struct SignalingServer {
    config: SignalingConfig,
}

impl SignalingServer {
    /// Create a server from a validated configuration
    pub fn new(config: SignalingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Bind the listener and start the accept loop and liveness sweep.
    ///
    /// Returns a handle exposing the bound address, the shared registry
    /// state and deterministic shutdown.
    pub async fn start(self) -> Result<SignalingServerHandle> {
        let acceptor = self.build_acceptor();
        let secure = acceptor.is_some();

        let state = Arc::new(SharedState::new(
            self.config.relay.clone(),
            secure,
            self.config.outbound_queue,
        ));

        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!(
            "Signaling server listening on {}://{}",
            if secure { "wss" } else { "ws" },
            local_addr
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let sweep_task = tokio::spawn(heartbeat::run(
            Arc::clone(&state),
            Duration::from_millis(self.config.heartbeat_interval_ms),
            shutdown_tx.subscribe(),
        ));

        let accept_task = tokio::spawn(accept_loop(
            listener,
            acceptor,
            Arc::clone(&state),
            shutdown_tx.subscribe(),
        ));

        Ok(SignalingServerHandle {
            local_addr,
            secure,
            state,
            shutdown_tx,
            tasks: vec![accept_task, sweep_task],
        })
    }

    /// TLS acceptor from the configured certificate pair, falling back to
    /// plaintext on any loading problem
    fn build_acceptor(&self) -> Option<TlsAcceptor> {
        let (cert, key) = match (&self.config.cert_path, &self.config.key_path) {
            (Some(cert), Some(key)) => (cert, key),
            _ => {
                info!("No TLS certificate configured, serving plaintext WebSocket");
                return None;
            }
        };

        match tls::load_acceptor(cert, key) {
            Ok(acceptor) => {
                info!("TLS certificate loaded, serving encrypted WebSocket");
                Some(acceptor)
            }
            Err(e) => {
                warn!("Failed to load TLS certificate, falling back to plaintext: {}", e);
                None
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    state: Arc<SharedState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        debug!("Accepted connection from {}", peer_addr);
                        let state = Arc::clone(&state);
                        let acceptor = acceptor.clone();
                        tokio::spawn(async move {
                            let result = match acceptor {
                                Some(acceptor) => match acceptor.accept(stream).await {
                                    Ok(tls_stream) => {
                                        handler::handle_connection(tls_stream, peer_addr, state).await
                                    }
                                    Err(e) => {
                                        warn!("TLS handshake failed for {}: {}", peer_addr, e);
                                        return;
                                    }
                                },
                                None => handler::handle_connection(stream, peer_addr, state).await,
                            };
                            if let Err(e) = result {
                                debug!("Connection from {} ended with error: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Signaling server accept loop received shutdown signal");
                break;
            }
        }
    }
}

/// Handle for controlling a running signaling server
pub struct SignalingServerHandle {
    local_addr: SocketAddr,
    secure: bool,
    state: Arc<SharedState>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl SignalingServerHandle {
    /// Bound listener address (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the listener is TLS
    pub fn secure(&self) -> bool {
        self.secure
    }

    /// Shared state, for the status endpoint
    pub fn state(&self) -> Arc<SharedState> {
        Arc::clone(&self.state)
    }

    /// Registry occupancy snapshot
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.state.snapshot()
    }

    /// Stop accepting, cancel the liveness sweep and evict every open
    /// connection through normal close handling
    pub async fn shutdown(mut self) {
        info!("Shutting down signaling server");
        let _ = self.shutdown_tx.send(());

        for conn in self.state.open_connections() {
            conn.close();
        }

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Server task failed during shutdown: {}", e);
                }
            }
        }

        info!("Signaling server shut down");
    }
}

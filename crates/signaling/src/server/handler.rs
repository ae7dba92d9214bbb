//! Per-connection message handling
//!
//! Each accepted socket gets a read loop (this module), a writer task
//! draining the connection's outbound queue, and a [`ConnectionHandle`]
//! shared with the registry and the heartbeat sweep.
//!
//! Dispatch is synchronous: every inbound frame is handled as one
//! non-preemptible step, with registry lookups, slot mutation and the
//! best-effort forward to the peer all under the registry lock and no
//! `.await` in between. Slot mutation is therefore atomic per step and the
//! peer observes forwarded messages in the sender's send order.

use crate::config::RelayConfig;
use crate::connection::{ConnectionHandle, OutboundFrame};
use crate::protocol::{ClientMessage, Role, ServerMessage};
use crate::registry::{RegisterOutcome, Registry, RegistrySnapshot};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Message, Result as WsResult},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared state across all connections
pub struct SharedState {
    /// The two-slot role registry; the single shared-mutable boundary
    pub registry: Mutex<Registry>,
    /// Every open connection, registered or not, for the heartbeat sweep
    pub connections: Mutex<HashMap<Uuid, Arc<ConnectionHandle>>>,
    /// Traversal-helper list handed to clients
    pub relay: RelayConfig,
    /// Whether the signaling listener is TLS, reported by the status endpoint
    pub secure: bool,
    /// Per-connection outbound queue capacity
    pub outbound_queue: usize,
}

impl SharedState {
    pub fn new(relay: RelayConfig, secure: bool, outbound_queue: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
            connections: Mutex::new(HashMap::new()),
            relay,
            secure,
            outbound_queue,
        }
    }

    /// Registry occupancy, for status reporting
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry.lock().snapshot()
    }

    /// Handles to every open connection
    pub fn open_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.lock().values().cloned().collect()
    }
}

/// Per-connection protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Unassigned,
    Assigned(Role),
}

/// Handle a single accepted socket until it closes
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    state: Arc<SharedState>,
) -> WsResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws_stream = accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(state.outbound_queue);
    let conn = ConnectionHandle::new(addr, tx);
    info!(conn = %conn.id(), %addr, "New WebSocket connection established");

    state.connections.lock().insert(conn.id(), Arc::clone(&conn));

    // Writer task: sole owner of the sink, drains the outbound queue
    let writer_conn = conn.id();
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let message = match frame {
                OutboundFrame::Text(text) => Message::Text(text),
                OutboundFrame::Ping => Message::Ping(Vec::new()),
                OutboundFrame::Pong(payload) => Message::Pong(payload),
                OutboundFrame::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            };
            if let Err(e) = ws_tx.send(message).await {
                debug!(conn = %writer_conn, "WebSocket send failed: {}", e);
                break;
            }
        }
    });

    conn.send(&ServerMessage::Welcome {
        relay_config: state.relay.clone(),
    });

    let mut conn_state = ConnState::Unassigned;

    loop {
        tokio::select! {
            _ = conn.wait_closed() => break,
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    dispatch(&text, &conn, &mut conn_state, &state);
                }
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => dispatch(text, &conn, &mut conn_state, &state),
                    Err(_) => {
                        conn.send(&ServerMessage::Error {
                            message: "Invalid message format".to_string(),
                        });
                    }
                },
                Some(Ok(Message::Pong(_))) => conn.mark_alive(),
                Some(Ok(Message::Ping(payload))) => conn.pong(payload),
                Some(Ok(Message::Close(_))) => {
                    debug!(conn = %conn.id(), "WebSocket closed by client");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(conn = %conn.id(), "WebSocket error: {}", e);
                    break;
                }
                None => break,
            }
        }
    }

    cleanup(&conn, conn_state, &state);
    writer_task.await.ok();

    Ok(())
}

/// Teardown after the read loop exits, for any reason: release the registry
/// slot, notify the surviving peer, drop the connection from the sweep set.
fn cleanup(conn: &Arc<ConnectionHandle>, conn_state: ConnState, state: &SharedState) {
    conn.close();
    state.connections.lock().remove(&conn.id());

    let mut registry = state.registry.lock();
    if let Some(vacated) = registry.release(conn.id()) {
        info!(conn = %conn.id(), role = %vacated, "Registered peer disconnected");
        if let Some(peer) = registry.get(vacated.opposite()) {
            peer.send(&ServerMessage::PeerDisconnected { peer: vacated });
        }
    } else if conn_state == ConnState::Unassigned {
        debug!(conn = %conn.id(), "Unregistered connection closed");
    }
}

/// Handle one inbound frame as a single non-preemptible step
fn dispatch(
    text: &str,
    conn: &Arc<ConnectionHandle>,
    conn_state: &mut ConnState,
    state: &SharedState,
) {
    let message = ClientMessage::decode(text);
    debug!(conn = %conn.id(), kind = message.kind(), "Received message");

    match message {
        ClientMessage::Register { role } => handle_register(&role, conn, conn_state, state),
        ClientMessage::Offer { sdp } => {
            handle_negotiation(Role::Initiator, conn_state, state, conn, || {
                ServerMessage::Offer { sdp }
            })
        }
        ClientMessage::Answer { sdp } => {
            handle_negotiation(Role::Responder, conn_state, state, conn, || {
                ServerMessage::Answer { sdp }
            })
        }
        ClientMessage::IceCandidate { candidate } => {
            handle_ice_candidate(candidate, conn, *conn_state, state)
        }
        ClientMessage::GetRelayConfig => {
            conn.send(&ServerMessage::RelayConfig {
                relay_config: state.relay.clone(),
            });
        }
        ClientMessage::Unknown { kind } => {
            debug!(conn = %conn.id(), kind = %kind, "Ignoring unknown message type");
        }
        ClientMessage::Malformed => {
            conn.send(&ServerMessage::Error {
                message: "Invalid message format".to_string(),
            });
        }
    }
}

fn handle_register(
    role: &str,
    conn: &Arc<ConnectionHandle>,
    conn_state: &mut ConnState,
    state: &SharedState,
) {
    let role: Role = match role.parse() {
        Ok(role) => role,
        Err(()) => {
            conn.send(&ServerMessage::Error {
                message: "Invalid role. Must be \"initiator\" or \"responder\"".to_string(),
            });
            return;
        }
    };

    if let ConnState::Assigned(held) = *conn_state {
        conn.send(&ServerMessage::Error {
            message: format!("Already registered as {held}"),
        });
        return;
    }

    let mut registry = state.registry.lock();
    match registry.try_register(conn, role) {
        RegisterOutcome::Registered => {
            *conn_state = ConnState::Assigned(role);
            info!(conn = %conn.id(), %role, "Peer registered");
            conn.send(&ServerMessage::Registered {
                role,
                relay_config: state.relay.clone(),
            });

            if let Some(peer) = registry.get(role.opposite()) {
                peer.send(&ServerMessage::PeerConnected { peer: role });
                conn.send(&ServerMessage::PeerConnected {
                    peer: role.opposite(),
                });
                info!("Both peers are now connected");
            } else {
                debug!("Waiting for {} to connect", role.opposite());
            }
        }
        RegisterOutcome::RoleTaken => {
            warn!(conn = %conn.id(), %role, "Registration rejected: role already taken");
            conn.send(&ServerMessage::Error {
                message: format!("{role} role is already taken"),
            });
        }
        RegisterOutcome::AlreadyAssigned => {
            // Unreachable through the protocol (conn_state is checked above)
            // but the registry self-guards against double occupancy
            error!(conn = %conn.id(), "Registry slot state out of sync with connection state");
            conn.send(&ServerMessage::Error {
                message: "Connection already holds a role".to_string(),
            });
        }
    }
}

/// Shared offer/answer path: sender must hold `required_role` and the
/// opposite slot must be open, otherwise the sender gets a specific error
/// and the peer receives nothing.
fn handle_negotiation(
    required_role: Role,
    conn_state: &ConnState,
    state: &SharedState,
    conn: &Arc<ConnectionHandle>,
    forward: impl FnOnce() -> ServerMessage,
) {
    let kind = match required_role {
        Role::Initiator => "offer",
        Role::Responder => "answer",
    };

    if *conn_state != ConnState::Assigned(required_role) {
        conn.send(&ServerMessage::Error {
            message: format!("Only the {required_role} can send {kind}"),
        });
        return;
    }

    let target = required_role.opposite();
    match state.registry.lock().get(target) {
        Some(peer) => {
            debug!(conn = %conn.id(), "Forwarding {} from {} to {}", kind, required_role, target);
            peer.send(&forward());
        }
        None => {
            conn.send(&ServerMessage::Error {
                message: format!("No {target} connected"),
            });
        }
    }
}

fn handle_ice_candidate(
    candidate: serde_json::Value,
    conn: &Arc<ConnectionHandle>,
    conn_state: ConnState,
    state: &SharedState,
) {
    // Candidates may legitimately arrive before both sides finish
    // negotiating, so an unreachable peer is not an error here
    let ConnState::Assigned(role) = conn_state else {
        debug!(conn = %conn.id(), "Dropping ICE candidate from unregistered connection");
        return;
    };

    let target = role.opposite();
    match state.registry.lock().get(target) {
        Some(peer) => {
            debug!(conn = %conn.id(), "Forwarding ICE candidate from {} to {}", role, target);
            peer.send(&ServerMessage::IceCandidate { candidate });
        }
        None => {
            debug!(conn = %conn.id(), "Cannot forward ICE candidate: {} not connected", target);
        }
    }
}

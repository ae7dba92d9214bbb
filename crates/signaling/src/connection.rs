//! Per-connection handle
//!
//! One [`ConnectionHandle`] exists per accepted transport session. It is the
//! only thing other tasks ever touch: outbound delivery goes through a
//! bounded queue drained by the connection's writer task, and teardown goes
//! through [`ConnectionHandle::close`], which wakes the connection's read
//! loop so normal close handling runs there.

use crate::protocol::ServerMessage;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

/// Frame queued for the connection's writer task
#[derive(Debug)]
pub enum OutboundFrame {
    /// JSON text frame
    Text(String),
    /// Liveness probe
    Ping,
    /// Reply to a client ping
    Pong(Vec<u8>),
    /// Close the WebSocket
    Close,
}

/// Handle to one live connection
pub struct ConnectionHandle {
    id: Uuid,
    addr: SocketAddr,
    outbound: mpsc::Sender<OutboundFrame>,
    /// False once teardown has started; a closed connection never occupies
    /// a registry slot
    open: AtomicBool,
    /// Liveness flag: set on every pong, cleared at the start of each sweep
    alive: AtomicBool,
    /// Wakes the read loop when the server evicts the connection
    closed: Notify,
}

impl ConnectionHandle {
    /// Create a handle around the outbound queue of a freshly accepted
    /// connection
    pub fn new(addr: SocketAddr, outbound: mpsc::Sender<OutboundFrame>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            addr,
            outbound,
            open: AtomicBool::new(true),
            alive: AtomicBool::new(true),
            closed: Notify::new(),
        })
    }

    /// Unique connection id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Remote address, for diagnostics
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether the transport is still open
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Best-effort send. Never blocks; a full queue or a closed connection
    /// drops the frame.
    pub fn send(&self, message: &ServerMessage) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.outbound.try_send(OutboundFrame::Text(message.encode())) {
            Ok(()) => true,
            Err(e) => {
                warn!(conn = %self.id, addr = %self.addr, "Dropping outbound frame: {}", e);
                false
            }
        }
    }

    /// Queue a liveness probe
    pub fn ping(&self) {
        let _ = self.outbound.try_send(OutboundFrame::Ping);
    }

    /// Queue a pong reply to a client ping
    pub fn pong(&self, payload: Vec<u8>) {
        let _ = self.outbound.try_send(OutboundFrame::Pong(payload));
    }

    /// Record a liveness response
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    /// Read and clear the liveness flag (one sweep step). Returns the value
    /// the flag had before clearing.
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::SeqCst)
    }

    /// Start teardown: mark the connection closed, queue a close frame and
    /// wake the read loop. Idempotent.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!(conn = %self.id, addr = %self.addr, "Closing connection");
            let _ = self.outbound.try_send(OutboundFrame::Close);
            // notify_one stores a permit, so a read loop that is between
            // polls still observes the close on its next wait
            self.closed.notify_one();
        }
    }

    /// Resolves once [`close`](Self::close) has been called
    pub async fn wait_closed(&self) {
        if !self.is_open() {
            return;
        }
        self.closed.notified().await;
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;

    fn handle(capacity: usize) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = ConnectionHandle::new("127.0.0.1:9999".parse().unwrap(), tx);
        (conn, rx)
    }

    #[test]
    fn test_send_queues_text_frame() {
        let (conn, mut rx) = handle(4);
        assert!(conn.send(&ServerMessage::Welcome {
            relay_config: RelayConfig::default(),
        }));
        match rx.try_recv().unwrap() {
            OutboundFrame::Text(text) => assert!(text.contains("welcome")),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_send_after_close_is_dropped() {
        let (conn, mut rx) = handle(4);
        conn.close();
        assert!(!conn.is_open());
        assert!(!conn.send(&ServerMessage::Error {
            message: "late".to_string(),
        }));
        // Only the close frame made it out
        assert!(matches!(rx.try_recv().unwrap(), OutboundFrame::Close));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_drops_frame() {
        let (conn, _rx) = handle(1);
        conn.ping();
        assert!(!conn.send(&ServerMessage::Error {
            message: "overflow".to_string(),
        }));
    }

    #[test]
    fn test_liveness_flag_cycle() {
        let (conn, _rx) = handle(4);
        assert!(conn.take_alive());
        assert!(!conn.take_alive());
        conn.mark_alive();
        assert!(conn.take_alive());
    }
}

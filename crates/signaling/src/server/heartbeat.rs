//! Liveness sweep
//!
//! Runs on a fixed period against every open connection, registered or not.
//! Each sweep: a connection whose liveness flag is still clear missed a full
//! probe cycle and is evicted; everyone else has the flag cleared and gets a
//! ping. Pong handling in the read loop sets the flag back. A dead
//! connection therefore survives at most two sweep periods.
//!
//! Probe emission and eviction are per-connection and non-blocking (queue
//! pushes and a close signal), so a slow connection never stalls the sweep.

use super::handler::SharedState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Run the sweep until the shutdown channel fires
pub async fn run(
    state: Arc<SharedState>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // interval fires immediately; the first real sweep is one period in
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => sweep(&state),
            _ = shutdown_rx.recv() => {
                debug!("Liveness sweep received shutdown signal");
                break;
            }
        }
    }

    info!("Liveness sweep stopped");
}

/// One pass over a snapshot of the open connections
fn sweep(state: &SharedState) {
    let connections = state.open_connections();
    debug!(connections = connections.len(), "Liveness sweep");

    for conn in connections {
        if conn.take_alive() {
            conn.ping();
        } else {
            warn!(conn = %conn.id(), addr = %conn.addr(), "Terminating unresponsive connection");
            conn.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::connection::{ConnectionHandle, OutboundFrame};
    use tokio::sync::mpsc;

    fn state_with_conn() -> (Arc<SharedState>, Arc<ConnectionHandle>, mpsc::Receiver<OutboundFrame>) {
        let state = Arc::new(SharedState::new(RelayConfig::default(), false, 8));
        let (tx, rx) = mpsc::channel(8);
        let conn = ConnectionHandle::new("127.0.0.1:9999".parse().unwrap(), tx);
        state
            .connections
            .lock()
            .insert(conn.id(), Arc::clone(&conn));
        (state, conn, rx)
    }

    #[test]
    fn test_first_sweep_pings_live_connection() {
        let (state, conn, mut rx) = state_with_conn();
        sweep(&state);
        assert!(conn.is_open());
        assert!(matches!(rx.try_recv().unwrap(), OutboundFrame::Ping));
    }

    #[test]
    fn test_second_sweep_without_pong_evicts() {
        let (state, conn, mut rx) = state_with_conn();
        sweep(&state);
        sweep(&state);
        assert!(!conn.is_open());
        assert!(matches!(rx.try_recv().unwrap(), OutboundFrame::Ping));
        assert!(matches!(rx.try_recv().unwrap(), OutboundFrame::Close));
    }

    #[test]
    fn test_pong_between_sweeps_keeps_connection() {
        let (state, conn, _rx) = state_with_conn();
        sweep(&state);
        conn.mark_alive();
        sweep(&state);
        assert!(conn.is_open());
    }
}

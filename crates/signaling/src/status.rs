//! Read-only HTTP status endpoint
//!
//! `GET /status` reports registry slot occupancy and whether the signaling
//! listener is TLS. When an assets directory is configured, its files are
//! served from the same listener. Reads nothing but the registry snapshot.

use crate::error::Result;
use crate::server::SharedState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tracing::{error, info};

/// Response body for `GET /status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// `"connected"` or `"disconnected"`
    pub initiator: &'static str,
    /// `"connected"` or `"disconnected"`
    pub responder: &'static str,
    /// Whether the signaling listener is TLS
    pub secure: bool,
}

fn occupancy(occupied: bool) -> &'static str {
    if occupied {
        "connected"
    } else {
        "disconnected"
    }
}

async fn status(State(state): State<Arc<SharedState>>) -> Json<StatusSnapshot> {
    let snapshot = state.snapshot();
    Json(StatusSnapshot {
        initiator: occupancy(snapshot.initiator),
        responder: occupancy(snapshot.responder),
        secure: state.secure,
    })
}

/// Build the status router, optionally serving static assets as a fallback
pub fn router(state: Arc<SharedState>, assets_dir: Option<PathBuf>) -> Router {
    let mut router = Router::new()
        .route("/status", get(status))
        .with_state(state);

    if let Some(dir) = assets_dir {
        info!("Serving static assets from {}", dir.display());
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
}

/// Handle for the running status listener
pub struct StatusServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl StatusServerHandle {
    /// Bound listener address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the listener
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
        info!("Status endpoint shut down");
    }
}

/// Bind and serve the status endpoint until shut down
pub async fn serve(
    addr: SocketAddr,
    state: Arc<SharedState>,
    assets_dir: Option<PathBuf>,
) -> Result<StatusServerHandle> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("Status endpoint listening on http://{}/status", local_addr);

    let app = router(state, assets_dir);
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

    let task = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.recv().await;
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("Status endpoint error: {}", e);
        }
    });

    Ok(StatusServerHandle {
        local_addr,
        shutdown_tx,
        task,
    })
}

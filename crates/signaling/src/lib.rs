//! PairLink signaling relay
//!
//! Relays WebRTC session negotiation between exactly two peers that cannot
//! reach each other directly. Each connecting client claims one of two fixed
//! roles (`initiator` or `responder`); the server forwards offer/answer/ICE
//! payloads between the role holders and tells each side when the other
//! connects, disconnects, or stops answering liveness probes.
//!
//! # Architecture
//!
//! - [`registry`] — the two-slot role registry; pure state, no I/O.
//! - [`protocol`] — wire message types and boundary decoding.
//! - [`connection`] — per-connection handle (outbound queue, liveness flag).
//! - [`server`] — WebSocket accept loop, per-message dispatch, heartbeat sweep.
//! - [`status`] — read-only HTTP status endpoint + optional static assets.
//! - [`tls`] — certificate loading for the optional encrypted listener.
//!
//! All registry and connection-set mutation is serialized behind sync locks
//! and no `.await` occurs inside a message-handling step, so each inbound
//! event is processed as one atomic step against shared state.

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod status;
pub mod tls;

pub use config::{IceServerConfig, RelayConfig, SignalingConfig};
pub use error::{Error, Result};
pub use protocol::{ClientMessage, Role, ServerMessage};
pub use registry::{RegisterOutcome, Registry, RegistrySnapshot};
pub use server::{SignalingServer, SignalingServerHandle};

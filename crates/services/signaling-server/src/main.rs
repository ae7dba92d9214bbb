//! Signaling server binary entry point
//!
//! Starts the PairLink signaling relay: a WebSocket endpoint that pairs one
//! `initiator` with one `responder` and forwards their negotiation messages,
//! plus an HTTP status endpoint.
//!
//! # Usage
//!
//! ```bash
//! # Plaintext signaling on the default port
//! cargo run -p pairlink-signaling-server -- --bind 0.0.0.0:8080
//!
//! # Encrypted signaling with a TURN relay and static assets
//! cargo run -p pairlink-signaling-server -- \
//!   --cert ./cert.pem --key ./key.pem \
//!   --turn-url turn:relay.example.com:3478 \
//!   --turn-username user --turn-credential pass \
//!   --assets-dir ./public
//! ```

use clap::Parser;
use pairlink_signaling::{
    status, IceServerConfig, RelayConfig, SignalingConfig, SignalingServer,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// PairLink Signaling Server
///
/// Relays WebRTC session negotiation between exactly two peers.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket listener address
    #[arg(long, default_value = "0.0.0.0:8080", env = "SIGNALING_BIND_ADDRESS")]
    bind: SocketAddr,

    /// HTTP status endpoint address
    #[arg(long, default_value = "0.0.0.0:8081", env = "SIGNALING_STATUS_ADDRESS")]
    status_bind: SocketAddr,

    /// Disable the status endpoint
    #[arg(long)]
    no_status: bool,

    /// Liveness sweep period in milliseconds
    #[arg(long, default_value_t = 30_000, env = "SIGNALING_HEARTBEAT_MS")]
    heartbeat_ms: u64,

    /// STUN servers (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302,stun:stun1.l.google.com:19302,stun:stun2.l.google.com:19302"
    )]
    stun_servers: Vec<String>,

    /// TURN server URL (optional; placed ahead of the STUN entries)
    #[arg(long, env = "SIGNALING_TURN_URL")]
    turn_url: Option<String>,

    /// TURN username
    #[arg(long, env = "SIGNALING_TURN_USERNAME", requires = "turn_url")]
    turn_username: Option<String>,

    /// TURN credential
    #[arg(long, env = "SIGNALING_TURN_CREDENTIAL", requires = "turn_url")]
    turn_credential: Option<String>,

    /// PEM certificate chain for wss:// (requires --key)
    #[arg(long, env = "SIGNALING_CERT_PATH", requires = "key")]
    cert: Option<PathBuf>,

    /// PEM private key for wss:// (requires --cert)
    #[arg(long, env = "SIGNALING_KEY_PATH", requires = "cert")]
    key: Option<PathBuf>,

    /// Directory of static assets served by the status endpoint
    #[arg(long, env = "SIGNALING_ASSETS_DIR")]
    assets_dir: Option<PathBuf>,
}

impl Args {
    fn relay_config(&self) -> RelayConfig {
        let mut ice_servers = Vec::new();

        if let Some(url) = &self.turn_url {
            match (&self.turn_username, &self.turn_credential) {
                (Some(username), Some(credential)) => {
                    ice_servers.push(IceServerConfig::turn(url, username, credential));
                    // Same host usually answers STUN as well
                    if let Some(host) = url.strip_prefix("turn:") {
                        ice_servers.push(IceServerConfig::stun(format!("stun:{host}")));
                    }
                }
                _ => {
                    warn!("TURN URL given without credentials, adding as credential-less entry");
                    ice_servers.push(IceServerConfig::stun(url));
                }
            }
        }

        ice_servers.extend(self.stun_servers.iter().map(IceServerConfig::stun));
        RelayConfig { ice_servers }
    }

    fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            bind_addr: self.bind,
            status_addr: (!self.no_status).then_some(self.status_bind),
            heartbeat_interval_ms: self.heartbeat_ms,
            relay: self.relay_config(),
            cert_path: self.cert.clone(),
            key_path: self.key.clone(),
            assets_dir: self.assets_dir.clone(),
            ..Default::default()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Ctrl+C handler before anything else; a second signal forces exit
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);

    ctrlc::set_handler(move || {
        let was_already_set = shutdown_flag_handler.swap(true, Ordering::SeqCst);
        if was_already_set {
            eprintln!("Shutdown already in progress, forcing immediate exit");
            std::process::exit(0);
        }
        eprintln!("\nShutdown signal received, stopping server...");
    })
    .expect("Failed to set Ctrl+C handler");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("signaling-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_flag))
}

async fn async_main(
    args: Args,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "PairLink signaling server starting"
    );

    let config = args.signaling_config();
    let status_addr = config.status_addr;
    let assets_dir = config.assets_dir.clone();

    info!(
        bind = %config.bind_addr,
        heartbeat_ms = config.heartbeat_interval_ms,
        ice_servers = config.relay.ice_servers.len(),
        tls_requested = config.tls_requested(),
        "Configuration loaded"
    );

    let server = SignalingServer::new(config)?.start().await?;
    info!(
        "Signaling endpoint ready on {}://{}",
        if server.secure() { "wss" } else { "ws" },
        server.local_addr()
    );

    let status_server = match status_addr {
        Some(addr) => Some(status::serve(addr, server.state(), assets_dir).await?),
        None => None,
    };

    info!("Server running. Press Ctrl+C to shutdown.");

    while !shutdown_flag.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    info!("Shutdown signal received, cleaning up...");

    server.shutdown().await;
    if let Some(status_server) = status_server {
        status_server.shutdown().await;
    }

    info!("Signaling server shut down gracefully");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

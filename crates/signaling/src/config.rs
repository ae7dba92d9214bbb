//! Configuration types for the signaling relay

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Main configuration for the signaling server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// WebSocket listener address (default: 0.0.0.0:8080)
    pub bind_addr: SocketAddr,

    /// HTTP status endpoint address (None disables the endpoint)
    pub status_addr: Option<SocketAddr>,

    /// Liveness sweep period in milliseconds (default: 30000).
    ///
    /// A connection that misses one full probe cycle is evicted, so the
    /// longest a dead connection survives is twice this period.
    pub heartbeat_interval_ms: u64,

    /// Traversal-helper (STUN/TURN) descriptors handed to every client
    pub relay: RelayConfig,

    /// PEM certificate chain for the encrypted listener (optional)
    pub cert_path: Option<PathBuf>,

    /// PEM private key for the encrypted listener (optional)
    pub key_path: Option<PathBuf>,

    /// Directory of static assets served by the status endpoint (optional)
    pub assets_dir: Option<PathBuf>,

    /// Per-connection outbound queue capacity (default: 128).
    ///
    /// Delivery is best-effort: a frame that does not fit is dropped rather
    /// than blocking the sender's handling step.
    pub outbound_queue: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("valid default address"),
            status_addr: None,
            heartbeat_interval_ms: 30_000,
            relay: RelayConfig::default(),
            cert_path: None,
            key_path: None,
            assets_dir: None,
            outbound_queue: 128,
        }
    }
}

impl SignalingConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.heartbeat_interval_ms < 100 {
            return Err(Error::InvalidConfig(format!(
                "heartbeat_interval_ms must be at least 100, got {}",
                self.heartbeat_interval_ms
            )));
        }

        if self.outbound_queue == 0 {
            return Err(Error::InvalidConfig(
                "outbound_queue must be non-zero".to_string(),
            ));
        }

        if self.relay.ice_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN or TURN server is required".to_string(),
            ));
        }

        for server in &self.relay.ice_servers {
            let urls = server.urls.as_str();
            if !urls.starts_with("stun:")
                && !urls.starts_with("turn:")
                && !urls.starts_with("turns:")
            {
                return Err(Error::InvalidConfig(format!(
                    "ICE server URL must start with stun:, turn: or turns:, got {urls}"
                )));
            }
        }

        // Cert and key only make sense as a pair
        if self.cert_path.is_some() != self.key_path.is_some() {
            return Err(Error::InvalidConfig(
                "cert_path and key_path must be provided together".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether the encrypted listener is requested (both paths set)
    pub fn tls_requested(&self) -> bool {
        self.cert_path.is_some() && self.key_path.is_some()
    }
}

/// Traversal-helper list handed to clients, in the shape WebRTC clients feed
/// directly into their peer-connection constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Ordered STUN/TURN server descriptors
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![
                IceServerConfig::stun("stun:stun.l.google.com:19302"),
                IceServerConfig::stun("stun:stun1.l.google.com:19302"),
                IceServerConfig::stun("stun:stun2.l.google.com:19302"),
            ],
        }
    }
}

/// Single STUN/TURN server descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    /// Server URL (stun:, turn: or turns:)
    pub urls: String,

    /// Username for TURN authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Credential for TURN authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    /// STUN server descriptor (no credentials)
    pub fn stun(urls: impl Into<String>) -> Self {
        Self {
            urls: urls.into(),
            username: None,
            credential: None,
        }
    }

    /// TURN server descriptor with credentials
    pub fn turn(
        urls: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: urls.into(),
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SignalingConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.tls_requested());
    }

    #[test]
    fn test_heartbeat_too_small_rejected() {
        let config = SignalingConfig {
            heartbeat_interval_ms: 50,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_empty_ice_servers_rejected() {
        let config = SignalingConfig {
            relay: RelayConfig {
                ice_servers: vec![],
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_ice_url_scheme_rejected() {
        let config = SignalingConfig {
            relay: RelayConfig {
                ice_servers: vec![IceServerConfig::stun("http://example.com")],
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cert_without_key_rejected() {
        let config = SignalingConfig {
            cert_path: Some("cert.pem".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relay_config_wire_shape() {
        let relay = RelayConfig {
            ice_servers: vec![
                IceServerConfig::turn("turn:relay.example.com:3478", "user", "pass"),
                IceServerConfig::stun("stun:stun.l.google.com:19302"),
            ],
        };
        let json = serde_json::to_value(&relay).unwrap();
        assert_eq!(
            json["iceServers"][0]["urls"],
            "turn:relay.example.com:3478"
        );
        assert_eq!(json["iceServers"][0]["username"], "user");
        // Credentials absent from STUN entries, not null
        assert!(json["iceServers"][1].get("username").is_none());
    }
}

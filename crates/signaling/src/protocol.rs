//! Wire protocol for the signaling relay
//!
//! Messages are JSON records with a discriminating `type` field, exchanged as
//! WebSocket text frames. Inbound text is decoded at the boundary into the
//! closed [`ClientMessage`] set; anything unparseable or schema-violating
//! maps to [`ClientMessage::Malformed`], and a well-formed record whose
//! `type` is not part of the protocol maps to [`ClientMessage::Unknown`].
//! Neither of those variants carries a forwardable payload.

use crate::config::RelayConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// One of the two fixed participant identities in a negotiation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The side that creates the offer
    Initiator,
    /// The side that answers it
    Responder,
}

impl Role {
    /// The other role of the pair
    pub fn opposite(self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }

    /// Wire name of the role
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiator" => Ok(Role::Initiator),
            "responder" => Ok(Role::Responder),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages sent by clients
///
/// `sdp` and `candidate` payloads are opaque JSON values forwarded without
/// inspection. The `role` of a registration stays a raw string so an invalid
/// role name can be rejected with a specific reason instead of being lumped
/// in with malformed input.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Claim a role slot
    Register { role: String },
    /// Session description from the initiator, relayed to the responder
    Offer { sdp: Value },
    /// Session description from the responder, relayed to the initiator
    Answer { sdp: Value },
    /// Connectivity candidate, relayed to the opposite role
    IceCandidate { candidate: Value },
    /// Ask for the traversal-helper list
    GetRelayConfig,
    /// Well-formed record with a `type` outside the protocol; ignored
    Unknown { kind: String },
    /// Unparseable input or a known type with missing/invalid fields
    Malformed,
}

#[derive(Deserialize)]
struct RegisterFields {
    role: String,
}

#[derive(Deserialize)]
struct SdpFields {
    sdp: Value,
}

#[derive(Deserialize)]
struct CandidateFields {
    candidate: Value,
}

impl ClientMessage {
    /// Decode one inbound text frame.
    ///
    /// Never fails: boundary errors are represented as `Malformed` or
    /// `Unknown` so the dispatch layer stays total over this enum.
    pub fn decode(text: &str) -> ClientMessage {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => return ClientMessage::Malformed,
        };

        let kind = match value.get("type").and_then(Value::as_str) {
            Some(kind) => kind.to_owned(),
            None => return ClientMessage::Malformed,
        };

        match kind.as_str() {
            "register" => match serde_json::from_value::<RegisterFields>(value) {
                Ok(fields) => ClientMessage::Register { role: fields.role },
                Err(_) => ClientMessage::Malformed,
            },
            "offer" => match serde_json::from_value::<SdpFields>(value) {
                Ok(fields) => ClientMessage::Offer { sdp: fields.sdp },
                Err(_) => ClientMessage::Malformed,
            },
            "answer" => match serde_json::from_value::<SdpFields>(value) {
                Ok(fields) => ClientMessage::Answer { sdp: fields.sdp },
                Err(_) => ClientMessage::Malformed,
            },
            "ice-candidate" => match serde_json::from_value::<CandidateFields>(value) {
                Ok(fields) => ClientMessage::IceCandidate {
                    candidate: fields.candidate,
                },
                Err(_) => ClientMessage::Malformed,
            },
            "get-relay-config" => ClientMessage::GetRelayConfig,
            _ => ClientMessage::Unknown { kind },
        }
    }

    /// Wire type name, for diagnostics
    pub fn kind(&self) -> &str {
        match self {
            ClientMessage::Register { .. } => "register",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::IceCandidate { .. } => "ice-candidate",
            ClientMessage::GetRelayConfig => "get-relay-config",
            ClientMessage::Unknown { kind } => kind,
            ClientMessage::Malformed => "malformed",
        }
    }
}

/// Messages sent by the server
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Greeting sent to every accepted connection before anything else
    Welcome {
        #[serde(rename = "relayConfig")]
        relay_config: RelayConfig,
    },
    /// Registration confirmation
    Registered {
        role: Role,
        #[serde(rename = "relayConfig")]
        relay_config: RelayConfig,
    },
    /// Reply to an explicit relay-config request
    RelayConfig {
        #[serde(rename = "relayConfig")]
        relay_config: RelayConfig,
    },
    /// Forwarded session description (initiator → responder)
    Offer { sdp: Value },
    /// Forwarded session description (responder → initiator)
    Answer { sdp: Value },
    /// Forwarded connectivity candidate
    IceCandidate { candidate: Value },
    /// Both role slots are now occupied
    PeerConnected { peer: Role },
    /// The named role's connection went away
    PeerDisconnected { peer: Role },
    /// Rejection or format error; the connection stays open
    Error { message: String },
}

impl ServerMessage {
    /// Encode to a JSON text frame
    pub fn encode(&self) -> String {
        // ServerMessage contains only serializable fields; this cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_opposite() {
        assert_eq!(Role::Initiator.opposite(), Role::Responder);
        assert_eq!(Role::Responder.opposite(), Role::Initiator);
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("initiator".parse(), Ok(Role::Initiator));
        assert_eq!("responder".parse(), Ok(Role::Responder));
        assert!("sender".parse::<Role>().is_err());
    }

    #[test]
    fn test_decode_register() {
        let msg = ClientMessage::decode(r#"{"type":"register","role":"initiator"}"#);
        assert_eq!(
            msg,
            ClientMessage::Register {
                role: "initiator".to_string()
            }
        );
    }

    #[test]
    fn test_decode_register_missing_role_is_malformed() {
        let msg = ClientMessage::decode(r#"{"type":"register"}"#);
        assert_eq!(msg, ClientMessage::Malformed);
    }

    #[test]
    fn test_decode_offer_preserves_opaque_sdp() {
        let msg = ClientMessage::decode(r#"{"type":"offer","sdp":{"kind":"offer","v":1}}"#);
        assert_eq!(
            msg,
            ClientMessage::Offer {
                sdp: json!({"kind": "offer", "v": 1})
            }
        );
    }

    #[test]
    fn test_decode_unparseable_is_malformed() {
        assert_eq!(ClientMessage::decode("not json"), ClientMessage::Malformed);
        assert_eq!(ClientMessage::decode("[1,2,3]"), ClientMessage::Malformed);
        assert_eq!(
            ClientMessage::decode(r#"{"role":"initiator"}"#),
            ClientMessage::Malformed
        );
    }

    #[test]
    fn test_decode_unknown_type() {
        let msg = ClientMessage::decode(r#"{"type":"renegotiate","extra":true}"#);
        assert_eq!(
            msg,
            ClientMessage::Unknown {
                kind: "renegotiate".to_string()
            }
        );
    }

    #[test]
    fn test_server_message_wire_shape() {
        let msg = ServerMessage::PeerDisconnected {
            peer: Role::Responder,
        };
        let value: Value = serde_json::from_str(&msg.encode()).unwrap();
        assert_eq!(value["type"], "peer-disconnected");
        assert_eq!(value["peer"], "responder");
    }

    #[test]
    fn test_registered_carries_relay_config() {
        let msg = ServerMessage::Registered {
            role: Role::Initiator,
            relay_config: RelayConfig::default(),
        };
        let value: Value = serde_json::from_str(&msg.encode()).unwrap();
        assert_eq!(value["type"], "registered");
        assert_eq!(value["role"], "initiator");
        assert!(value["relayConfig"]["iceServers"].is_array());
    }
}

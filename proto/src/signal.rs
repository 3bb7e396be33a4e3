//! Signaling relay frames
//!
//! One JSON object per line on the upgraded `/room/<uuid>/signal` channel.
//!
//! The server originates exactly three frame types (`peers`, `peer-joined`,
//! `peer-left`). Everything else it relays verbatim: a client frame must
//! carry a `to` field naming a registered peer; the server forwards it to
//! that peer with `from` set to the sender's assigned id. Frames without
//! `to` are dropped silently.
//!
//! The negotiation payloads peers exchange through the relay (`offer`,
//! `answer`, `ice`) are defined here as well, but the server never parses
//! them - only the `to`/`from` envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::PeerId;

/// Name of the upgrade protocol carried in the `Upgrade:` header.
pub const SIGNAL_PROTOCOL: &str = "cove-signal/1";

/// Frames the relay itself originates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ControlFrame {
    /// Sent once right after registration: the ids already in the room and
    /// the id the server assigned to this connection.
    #[serde(rename = "peers")]
    Peers { peers: Vec<PeerId>, you: PeerId },
    /// Another client joined the room.
    #[serde(rename = "peer-joined")]
    PeerJoined {
        #[serde(rename = "peerId")]
        peer_id: PeerId,
    },
    /// Another client's connection closed.
    #[serde(rename = "peer-left")]
    PeerLeft {
        #[serde(rename = "peerId")]
        peer_id: PeerId,
    },
}

/// Anything a client can receive on the signaling channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalFrame {
    Control(ControlFrame),
    /// A relayed client frame; `from` is filled in by the server.
    Relayed { from: PeerId, body: Value },
}

impl SignalFrame {
    /// Decode one line from the channel.
    ///
    /// Returns `None` for anything that is neither a control frame nor a
    /// relayed frame with a valid `from` - the protocol drops malformed
    /// frames rather than tearing down the channel.
    pub fn decode(line: &str) -> Option<SignalFrame> {
        let value: Value = serde_json::from_str(line).ok()?;
        let type_tag = value.get("type").and_then(Value::as_str);
        if matches!(type_tag, Some("peers") | Some("peer-joined") | Some("peer-left")) {
            let control: ControlFrame = serde_json::from_value(value).ok()?;
            return Some(SignalFrame::Control(control));
        }
        let from: PeerId = value
            .get("from")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())?;
        Some(SignalFrame::Relayed { from, body: value })
    }
}

/// Transport negotiation messages exchanged between peers via the relay.
///
/// `metadata` is whatever the connector implementation needs to establish
/// the direct channel; the relay and the rendezvous treat it as opaque.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NegotiationFrame {
    #[serde(rename = "offer")]
    Offer { metadata: String },
    #[serde(rename = "answer")]
    Answer { metadata: String },
    #[serde(rename = "ice")]
    Ice { candidate: String },
}

impl NegotiationFrame {
    /// Encode for relaying, addressed to `to`.
    pub fn encode_to(&self, to: PeerId) -> String {
        let mut value = serde_json::to_value(self).expect("negotiation frames are serializable");
        value["to"] = Value::String(to.to_string());
        value.to_string()
    }

    /// Decode from a relayed frame body, if it is one of ours.
    pub fn decode(body: &Value) -> Option<NegotiationFrame> {
        serde_json::from_value(body.clone()).ok()
    }
}

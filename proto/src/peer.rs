//! Peer-to-peer datagram frames
//!
//! JSON frames on the ordered reliable channel between two peers. The
//! authentication frames must complete in both directions before the first
//! replication frame; anything out of order is a protocol violation that
//! terminates the transport.
//!
//! Binary payloads (challenges, HMAC responses, CRDT bytes) travel as
//! standard base64 strings.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Byte length of an authentication challenge and of its HMAC response.
pub const CHALLENGE_LEN: usize = 32;

/// A frame on the peer-to-peer channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PeerFrame {
    /// 32 random bytes the receiver must sign with the room's auth key.
    #[serde(rename = "auth-challenge")]
    AuthChallenge { challenge: String },
    /// HMAC of `challenge` under the auth key. Echoes the challenge so the
    /// verifier can match it against its own outstanding one.
    #[serde(rename = "auth-response")]
    AuthResponse { challenge: String, response: String },
    /// Advisory acknowledgement that our response verified remotely.
    #[serde(rename = "auth-success")]
    AuthSuccess,
    /// Ask the remote for its full document state.
    #[serde(rename = "yjs-sync-request")]
    SyncRequest,
    /// Full document snapshot.
    #[serde(rename = "yjs-sync-response")]
    SyncResponse { update: String },
    /// Incremental document update.
    #[serde(rename = "yjs-update")]
    Update { update: String },
}

/// Error decoding a peer frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecodeError {
    /// Not JSON, or not one of the six known frame types.
    Malformed,
    /// A base64 field failed to decode or had the wrong length.
    BadPayload,
}

impl fmt::Display for FrameDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameDecodeError::Malformed => write!(f, "malformed peer frame"),
            FrameDecodeError::BadPayload => write!(f, "bad frame payload"),
        }
    }
}

impl std::error::Error for FrameDecodeError {}

impl PeerFrame {
    /// Build an `auth-challenge` frame.
    pub fn challenge(challenge: &[u8; CHALLENGE_LEN]) -> Self {
        PeerFrame::AuthChallenge {
            challenge: BASE64.encode(challenge),
        }
    }

    /// Build an `auth-response` frame.
    pub fn response(challenge: &[u8; CHALLENGE_LEN], response: &[u8]) -> Self {
        PeerFrame::AuthResponse {
            challenge: BASE64.encode(challenge),
            response: BASE64.encode(response),
        }
    }

    /// Build a `yjs-sync-response` frame from raw CRDT bytes.
    pub fn sync_response(snapshot: &[u8]) -> Self {
        PeerFrame::SyncResponse {
            update: BASE64.encode(snapshot),
        }
    }

    /// Build a `yjs-update` frame from raw CRDT bytes.
    pub fn update(update: &[u8]) -> Self {
        PeerFrame::Update {
            update: BASE64.encode(update),
        }
    }

    /// Serialize to a single JSON line.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("peer frames are serializable")
    }

    /// Parse a received line. Unknown types and non-JSON are [`FrameDecodeError::Malformed`].
    pub fn decode(line: &str) -> Result<Self, FrameDecodeError> {
        serde_json::from_str(line).map_err(|_| FrameDecodeError::Malformed)
    }

    /// Whether this frame carries CRDT payload (forbidden before auth).
    pub fn is_replication(&self) -> bool {
        matches!(
            self,
            PeerFrame::SyncRequest | PeerFrame::SyncResponse { .. } | PeerFrame::Update { .. }
        )
    }
}

/// Decode a base64 field into exactly [`CHALLENGE_LEN`] bytes.
pub fn decode_challenge(field: &str) -> Result<[u8; CHALLENGE_LEN], FrameDecodeError> {
    let bytes = BASE64
        .decode(field)
        .map_err(|_| FrameDecodeError::BadPayload)?;
    if bytes.len() != CHALLENGE_LEN {
        return Err(FrameDecodeError::BadPayload);
    }
    let mut out = [0u8; CHALLENGE_LEN];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Decode a base64 payload field (arbitrary length).
pub fn decode_payload(field: &str) -> Result<Vec<u8>, FrameDecodeError> {
    BASE64
        .decode(field)
        .map_err(|_| FrameDecodeError::BadPayload)
}

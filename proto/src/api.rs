//! JSON bodies of the rendezvous HTTP surface
//!
//! All request and response bodies are UTF-8 JSON with camelCase field
//! names. Errors share a single `{ "error": "..." }` shape so clients can
//! always surface something readable.

use serde::{Deserialize, Serialize};

use crate::ids::{PeerId, RoomId};
use crate::share_code::ShareCode;

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// `POST /invite` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    pub room_id: RoomId,
}

/// `POST /invite` success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteResponse {
    pub code: ShareCode,
    /// Seconds until the code expires.
    pub expires_in: u64,
}

/// `POST /join/<code>` success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub room_id: RoomId,
    pub message: String,
}

/// `POST /room/<uuid>/announce` request.
///
/// The connection metadata fields are opaque to the server: it stores and
/// returns them, never inspects them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnounceRequest {
    pub peer_id: PeerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_offer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ice_candidates: Option<Vec<String>>,
}

/// `POST /room/<uuid>/announce` success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnounceResponse {
    pub success: bool,
    /// Seconds until this presence record expires without a refresh.
    pub expires_in: u64,
}

/// One presence record in `GET /room/<uuid>/peers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    pub peer_id: PeerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_offer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ice_candidates: Option<Vec<String>>,
    /// Unix milliseconds of the last announce.
    pub last_seen: u64,
}

/// `GET /room/<uuid>/peers` success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeersResponse {
    pub room_id: RoomId,
    pub peers: Vec<PeerRecord>,
    pub count: usize,
}

/// Error body used for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invite_request_uses_camel_case() {
        let req = InviteRequest {
            room_id: "550e8400-e29b-41d4-a716-446655440000".parse().unwrap(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"roomId":"550e8400-e29b-41d4-a716-446655440000"}"#
        );
    }

    #[test]
    fn test_announce_omits_absent_metadata() {
        let req = AnnounceRequest {
            peer_id: PeerId::from_bytes([7u8; 16]),
            sdp_offer: None,
            ice_candidates: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("sdpOffer"));
        assert!(!json.contains("iceCandidates"));
    }

    #[test]
    fn test_peers_response_roundtrip() {
        let room: RoomId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        let resp = PeersResponse {
            room_id: room,
            peers: vec![PeerRecord {
                peer_id: PeerId::from_bytes([1u8; 16]),
                sdp_offer: Some("meta".into()),
                ice_candidates: Some(vec!["a".into()]),
                last_seen: 1_700_000_000_000,
            }],
            count: 1,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"lastSeen\":1700000000000"));
        let back: PeersResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.count, 1);
        assert_eq!(back.peers[0].sdp_offer.as_deref(), Some("meta"));
    }
}

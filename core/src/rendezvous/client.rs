//! Typed rendezvous API client
//!
//! Wraps the HTTP surface and maps status codes onto the session error
//! taxonomy: 400 → `InvalidArgument`, 404 → `NotFound`, 429 →
//! `RateLimited`, 5xx → `Transient`.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use cove_proto::api::{
    AnnounceRequest, AnnounceResponse, ErrorResponse, InviteRequest, InviteResponse,
    JoinResponse, PeerRecord, PeersResponse,
};
use cove_proto::{PeerId, RoomId, ShareCode};

use super::super::session::SessionError;
use super::http;

/// Client for one rendezvous server.
#[derive(Debug, Clone)]
pub struct RendezvousClient {
    authority: String,
    path_prefix: String,
    deadline: Duration,
}

/// Split `http://host:port[/prefix]` into authority and path prefix.
///
/// Only plain `http` is spoken here; TLS belongs to a terminating proxy
/// in front of the rendezvous.
fn parse_base_url(url: &str) -> Result<(String, String), SessionError> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| SessionError::InvalidArgument(format!("unsupported rendezvous URL: {}", url)))?;
    let (authority, prefix) = match rest.split_once('/') {
        Some((authority, prefix)) => (authority, format!("/{}", prefix.trim_end_matches('/'))),
        None => (rest, String::new()),
    };
    if authority.is_empty() {
        return Err(SessionError::InvalidArgument(format!(
            "rendezvous URL has no host: {}",
            url
        )));
    }
    let prefix = if prefix == "/" { String::new() } else { prefix };
    Ok((authority.to_string(), prefix))
}

impl RendezvousClient {
    pub fn new(base_url: &str, deadline: Duration) -> Result<Self, SessionError> {
        let (authority, path_prefix) = parse_base_url(base_url)?;
        Ok(Self {
            authority,
            path_prefix,
            deadline,
        })
    }

    /// `host:port` of the server, for the signaling upgrade.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Path of the signaling endpoint for a room.
    pub fn signal_path(&self, room_id: &RoomId) -> String {
        format!("{}/room/{}/signal", self.path_prefix, room_id)
    }

    /// Mint a share code for a room.
    pub async fn create_invite(&self, room_id: &RoomId) -> Result<InviteResponse, SessionError> {
        let body = serde_json::to_string(&InviteRequest { room_id: *room_id })
            .map_err(|e| SessionError::Fatal(e.to_string()))?;
        self.call("POST", "/invite", Some(&body)).await
    }

    /// Redeem a share code. At most one caller ever succeeds per code.
    pub async fn redeem_invite(&self, code: &ShareCode) -> Result<RoomId, SessionError> {
        let path = format!("/join/{}", code);
        let response: JoinResponse = self.call("POST", &path, None).await?;
        Ok(response.room_id)
    }

    /// Refresh our presence record.
    pub async fn announce(
        &self,
        room_id: &RoomId,
        peer_id: PeerId,
        metadata: Option<String>,
    ) -> Result<AnnounceResponse, SessionError> {
        let body = serde_json::to_string(&AnnounceRequest {
            peer_id,
            sdp_offer: metadata,
            ice_candidates: None,
        })
        .map_err(|e| SessionError::Fatal(e.to_string()))?;
        let path = format!("/room/{}/announce", room_id);
        self.call("POST", &path, Some(&body)).await
    }

    /// List unexpired presence records for a room.
    pub async fn list_peers(&self, room_id: &RoomId) -> Result<Vec<PeerRecord>, SessionError> {
        let path = format!("/room/{}/peers", room_id);
        let response: PeersResponse = self.call("GET", &path, None).await?;
        Ok(response.peers)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        body: Option<&str>,
    ) -> Result<T, SessionError> {
        let full_path = format!("{}{}", self.path_prefix, path);
        let response = http::request(&self.authority, method, &full_path, body, self.deadline).await?;

        if (200..300).contains(&response.status) {
            return serde_json::from_str(&response.body).map_err(|e| {
                SessionError::Transient(format!("undecodable rendezvous response: {}", e))
            });
        }

        let detail = serde_json::from_str::<ErrorResponse>(&response.body)
            .map(|e| e.error)
            .unwrap_or_else(|_| format!("status {}", response.status));
        debug!(status = response.status, path = %full_path, detail = %detail, "rendezvous error");

        Err(match response.status {
            400 => SessionError::InvalidArgument(detail),
            404 => SessionError::NotFound(detail),
            429 => SessionError::RateLimited,
            _ => SessionError::Transient(detail),
        })
    }
}

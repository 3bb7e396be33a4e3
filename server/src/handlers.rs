//! Request routing and endpoint handlers
//!
//! Every request is gated by the per-IP rate limiter before any side
//! effect. Handlers are thin: parse, one short critical section against
//! the store, serialize. The only cross-request ordering requirement is
//! the atomic read-and-delete inside `Store::redeem_invite`, which the
//! store mutex provides.

use std::net::IpAddr;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::{debug, info};

use cove_proto::api::{
    AnnounceRequest, AnnounceResponse, HealthResponse, InviteRequest, InviteResponse,
    JoinResponse, PeerRecord, PeersResponse,
};
use cove_proto::{RoomId, ShareCode};

use crate::config::ServerConfig;
use crate::parse::{error_response, is_signal_upgrade, json_response, preflight_response};
use crate::rate_limit::{RateLimitResult, RateLimiter};
use crate::relay::Relay;
use crate::store::Store;

/// Shared state for all request handlers.
pub struct AppState {
    pub config: ServerConfig,
    pub store: Mutex<Store>,
    pub limiter: Mutex<RateLimiter>,
    pub relay: Relay,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let store = Store::new(config.share_code_ttl(), config.peer_ttl());
        let limiter = RateLimiter::new(config.rate_limit());
        let relay = Relay::new(config.max_relay_connections_per_ip);
        Self {
            config,
            store: Mutex::new(store),
            limiter: Mutex::new(limiter),
            relay,
        }
    }
}

/// What the connection task should do with a routed request.
pub enum RouteOutcome {
    /// Write this response and close.
    Respond(String),
    /// Send the 101 response and hand the socket to the relay.
    Upgrade { room_id: RoomId },
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Route one parsed request.
pub async fn route_request(
    state: &AppState,
    method: &str,
    path: &str,
    headers: &str,
    body: &str,
    ip: IpAddr,
) -> RouteOutcome {
    // The signaling relay is not metered per request; it has its own
    // per-IP connection cap checked at upgrade time.
    if let Some(room) = path.strip_prefix("/room/").and_then(|r| r.strip_suffix("/signal")) {
        if method != "GET" {
            return RouteOutcome::Respond(error_response(404, "not found"));
        }
        let Ok(room_id) = room.parse::<RoomId>() else {
            return RouteOutcome::Respond(error_response(400, "invalid room id"));
        };
        if !is_signal_upgrade(headers) {
            return RouteOutcome::Respond(error_response(426, "signaling requires upgrade"));
        }
        return RouteOutcome::Upgrade { room_id };
    }

    if method == "OPTIONS" {
        return RouteOutcome::Respond(preflight_response());
    }

    // Everything else counts against the caller's budget; a limited
    // request must have no side effects.
    {
        let mut limiter = state.limiter.lock().await;
        if let RateLimitResult::Limited { retry_after } = limiter.check(ip, Instant::now()) {
            debug!(ip = %ip, retry_after_s = retry_after.as_secs(), "rate limited");
            return RouteOutcome::Respond(error_response(429, "rate limited"));
        }
    }

    let response = match (method, path) {
        ("GET", "/health") => handle_health(),
        ("POST", "/invite") => handle_create_invite(state, body, ip).await,
        _ => {
            if let Some(code) = path.strip_prefix("/join/") {
                if method == "POST" {
                    handle_redeem_invite(state, code).await
                } else {
                    error_response(404, "not found")
                }
            } else if let Some(rest) = path.strip_prefix("/room/") {
                handle_room_route(state, method, rest, body).await
            } else {
                error_response(404, "not found")
            }
        }
    };
    RouteOutcome::Respond(response)
}

fn handle_health() -> String {
    let body = HealthResponse {
        status: "ok".to_string(),
    };
    json_response(200, &serde_json::to_string(&body).expect("health serializes"))
}

async fn handle_create_invite(state: &AppState, body: &str, ip: IpAddr) -> String {
    let Ok(request) = serde_json::from_str::<InviteRequest>(body) else {
        return error_response(400, "expected JSON body with a valid roomId");
    };

    let code = {
        let mut store = state.store.lock().await;
        store.create_invite(request.room_id, ip, Instant::now())
    };

    info!(room = %request.room_id.short(), code = %code, "invite created");
    let response = InviteResponse {
        code,
        expires_in: state.config.share_code_ttl_secs,
    };
    json_response(200, &serde_json::to_string(&response).expect("invite serializes"))
}

async fn handle_redeem_invite(state: &AppState, raw_code: &str) -> String {
    let Ok(code) = raw_code.parse::<ShareCode>() else {
        // Malformed codes can never have been minted; same answer as expired.
        return error_response(404, "unknown or expired share code");
    };

    let redeemed = {
        let mut store = state.store.lock().await;
        store.redeem_invite(&code, Instant::now())
    };

    match redeemed {
        Some(room_id) => {
            info!(room = %room_id.short(), code = %code, "invite redeemed");
            let response = JoinResponse {
                room_id,
                message: "joined".to_string(),
            };
            json_response(200, &serde_json::to_string(&response).expect("join serializes"))
        }
        None => error_response(404, "unknown or expired share code"),
    }
}

async fn handle_room_route(state: &AppState, method: &str, rest: &str, body: &str) -> String {
    let Some((room, tail)) = rest.split_once('/') else {
        return error_response(404, "not found");
    };
    let Ok(room_id) = room.parse::<RoomId>() else {
        return error_response(400, "invalid room id");
    };

    match (method, tail) {
        ("POST", "announce") => handle_announce(state, room_id, body).await,
        ("GET", "peers") => handle_list_peers(state, room_id).await,
        _ => error_response(404, "not found"),
    }
}

async fn handle_announce(state: &AppState, room_id: RoomId, body: &str) -> String {
    let Ok(request) = serde_json::from_str::<AnnounceRequest>(body) else {
        return error_response(400, "expected JSON body with a valid peerId");
    };

    {
        let mut store = state.store.lock().await;
        store.announce(
            room_id,
            request.peer_id,
            request.sdp_offer,
            request.ice_candidates,
            Instant::now(),
            unix_millis(),
        );
    }

    debug!(room = %room_id.short(), peer = %request.peer_id.short(), "presence announced");
    let response = AnnounceResponse {
        success: true,
        expires_in: state.config.peer_ttl_secs,
    };
    json_response(200, &serde_json::to_string(&response).expect("announce serializes"))
}

async fn handle_list_peers(state: &AppState, room_id: RoomId) -> String {
    let records = {
        let mut store = state.store.lock().await;
        store.list_peers(&room_id, Instant::now())
    };

    let peers: Vec<PeerRecord> = records
        .into_iter()
        .map(|r| PeerRecord {
            peer_id: r.peer_id,
            sdp_offer: r.sdp_offer,
            ice_candidates: r.ice_candidates,
            last_seen: r.last_seen_ms,
        })
        .collect();
    let count = peers.len();
    let response = PeersResponse {
        room_id,
        peers,
        count,
    };
    json_response(200, &serde_json::to_string(&response).expect("peers serializes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState::new(ServerConfig::for_testing())
    }

    fn ip() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    async fn respond(
        state: &AppState,
        method: &str,
        path: &str,
        body: &str,
    ) -> String {
        match route_request(state, method, path, "", body, ip()).await {
            RouteOutcome::Respond(r) => r,
            RouteOutcome::Upgrade { .. } => panic!("unexpected upgrade"),
        }
    }

    fn status_of(response: &str) -> u16 {
        response
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .expect("status line")
    }

    fn body_of(response: &str) -> &str {
        response.split("\r\n\r\n").nth(1).unwrap_or("")
    }

    const ROOM: &str = "550e8400-e29b-41d4-a716-446655440000";

    #[tokio::test]
    async fn test_health() {
        let state = state();
        let resp = respond(&state, "GET", "/health", "").await;
        assert_eq!(status_of(&resp), 200);
        assert!(body_of(&resp).contains("\"ok\""));
    }

    #[tokio::test]
    async fn test_invite_then_join_then_404() {
        let state = state();
        let body = format!(r#"{{"roomId":"{}"}}"#, ROOM);
        let resp = respond(&state, "POST", "/invite", &body).await;
        assert_eq!(status_of(&resp), 200);

        let invite: InviteResponse = serde_json::from_str(body_of(&resp)).unwrap();
        assert_eq!(invite.expires_in, state.config.share_code_ttl_secs);

        let join_path = format!("/join/{}", invite.code);
        let resp = respond(&state, "POST", &join_path, "").await;
        assert_eq!(status_of(&resp), 200);
        let join: JoinResponse = serde_json::from_str(body_of(&resp)).unwrap();
        assert_eq!(join.room_id.to_string(), ROOM);

        // Second redemption: the code is gone.
        let resp = respond(&state, "POST", &join_path, "").await;
        assert_eq!(status_of(&resp), 404);
    }

    #[tokio::test]
    async fn test_join_is_case_insensitive() {
        let state = state();
        let body = format!(r#"{{"roomId":"{}"}}"#, ROOM);
        let resp = respond(&state, "POST", "/invite", &body).await;
        let invite: InviteResponse = serde_json::from_str(body_of(&resp)).unwrap();

        let lower = invite.code.as_str().to_ascii_lowercase();
        let resp = respond(&state, "POST", &format!("/join/{}", lower), "").await;
        assert_eq!(status_of(&resp), 200);
    }

    #[tokio::test]
    async fn test_invite_rejects_bad_room_id() {
        let state = state();
        let resp = respond(&state, "POST", "/invite", r#"{"roomId":"nope"}"#).await;
        assert_eq!(status_of(&resp), 400);
        let resp = respond(&state, "POST", "/invite", "").await;
        assert_eq!(status_of(&resp), 400);
    }

    #[tokio::test]
    async fn test_join_malformed_code_is_404() {
        let state = state();
        let resp = respond(&state, "POST", "/join/???", "").await;
        assert_eq!(status_of(&resp), 404);
    }

    #[tokio::test]
    async fn test_announce_and_list_peers() {
        let state = state();
        let body = r#"{"peerId":"01010101-0101-0101-0101-010101010101","sdpOffer":"meta"}"#;
        let path = format!("/room/{}/announce", ROOM);
        let resp = respond(&state, "POST", &path, body).await;
        assert_eq!(status_of(&resp), 200);
        let announce: AnnounceResponse = serde_json::from_str(body_of(&resp)).unwrap();
        assert!(announce.success);
        assert_eq!(announce.expires_in, state.config.peer_ttl_secs);

        let resp = respond(&state, "GET", &format!("/room/{}/peers", ROOM), "").await;
        assert_eq!(status_of(&resp), 200);
        let peers: PeersResponse = serde_json::from_str(body_of(&resp)).unwrap();
        assert_eq!(peers.count, 1);
        assert_eq!(peers.peers[0].sdp_offer.as_deref(), Some("meta"));
    }

    #[tokio::test]
    async fn test_announce_rejects_bad_ids() {
        let state = state();
        let resp = respond(&state, "POST", "/room/not-a-room/announce", "{}").await;
        assert_eq!(status_of(&resp), 400);

        let path = format!("/room/{}/announce", ROOM);
        let resp = respond(&state, "POST", &path, r#"{"peerId":"zzz"}"#).await;
        assert_eq!(status_of(&resp), 400);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let state = state();
        assert_eq!(status_of(&respond(&state, "GET", "/nope", "").await), 404);
        assert_eq!(status_of(&respond(&state, "POST", "/room/x", "").await), 404);
        assert_eq!(
            status_of(&respond(&state, "DELETE", "/health", "").await),
            404
        );
    }

    #[tokio::test]
    async fn test_options_preflight() {
        let state = state();
        let resp = respond(&state, "OPTIONS", "/invite", "").await;
        assert_eq!(status_of(&resp), 204);
        assert!(resp.contains("Access-Control-Allow-Origin: *"));
    }

    #[tokio::test]
    async fn test_rate_limit_breach_has_no_side_effects() {
        let mut config = ServerConfig::for_testing();
        config.max_requests_per_ip_per_minute = 2;
        let state = AppState::new(config);

        let body = format!(r#"{{"roomId":"{}"}}"#, ROOM);
        assert_eq!(
            status_of(&respond(&state, "POST", "/invite", &body).await),
            200
        );
        assert_eq!(
            status_of(&respond(&state, "POST", "/invite", &body).await),
            200
        );
        let resp = respond(&state, "POST", "/invite", &body).await;
        assert_eq!(status_of(&resp), 429);

        // The limited request persisted nothing.
        let store = state.store.lock().await;
        assert_eq!(store.invite_count(), 2);
    }

    #[tokio::test]
    async fn test_signal_route_requires_upgrade() {
        let state = state();
        let path = format!("/room/{}/signal", ROOM);
        let resp = respond(&state, "GET", &path, "").await;
        assert_eq!(status_of(&resp), 426);

        let headers = "Connection: Upgrade\r\nUpgrade: cove-signal/1\r\n";
        match route_request(&state, "GET", &path, headers, "", ip()).await {
            RouteOutcome::Upgrade { room_id } => assert_eq!(room_id.to_string(), ROOM),
            RouteOutcome::Respond(r) => panic!("expected upgrade, got {}", r),
        }
    }

    #[tokio::test]
    async fn test_signal_route_rejects_bad_room() {
        let state = state();
        let resp = respond(&state, "GET", "/room/bad/signal", "").await;
        assert_eq!(status_of(&resp), 400);
    }

    #[tokio::test]
    async fn test_concurrent_redemption_single_winner() {
        let state = std::sync::Arc::new(state());
        let body = format!(r#"{{"roomId":"{}"}}"#, ROOM);
        let resp = respond(&state, "POST", "/invite", &body).await;
        let invite: InviteResponse = serde_json::from_str(body_of(&resp)).unwrap();
        let path = format!("/join/{}", invite.code);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let state = state.clone();
            let path = path.clone();
            handles.push(tokio::spawn(async move {
                match route_request(&state, "POST", &path, "", "", "127.0.0.1".parse().unwrap())
                    .await
                {
                    RouteOutcome::Respond(r) => r,
                    RouteOutcome::Upgrade { .. } => unreachable!(),
                }
            }));
        }

        let mut winners = 0;
        for handle in handles {
            let resp = handle.await.unwrap();
            if resp.starts_with("HTTP/1.1 200") {
                winners += 1;
            } else {
                assert!(resp.starts_with("HTTP/1.1 404"));
            }
        }
        assert_eq!(winners, 1);
    }
}

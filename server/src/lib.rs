//! Cove Rendezvous Server
//!
//! The untrusted bulletin board of the Cove protocol. It helps peers find
//! one another and nothing more: it learns room identifiers and ephemeral
//! connection metadata, never passwords, keys or document content.
//!
//! # Surface
//!
//! - `POST /invite` - mint a one-time share code for a room (TTL 300 s)
//! - `POST /join/<code>` - redeem a code, at most once
//! - `POST /room/<uuid>/announce` - refresh a presence record (TTL 120 s)
//! - `GET /room/<uuid>/peers` - list unexpired presence records
//! - `GET /room/<uuid>/signal` - upgrade to the signaling relay channel
//! - `GET /health`
//!
//! All state lives in an in-memory expiring store; restarting the server
//! loses nothing of value.
//!
//! # Module Structure
//!
//! - `config`: server configuration
//! - `store`: expiring key-value store (invites, presence)
//! - `rate_limit`: per-IP sliding window limiter
//! - `parse`: minimal HTTP/1.1 parsing and response formatting
//! - `handlers`: request routing and endpoint logic
//! - `relay`: the per-room signaling relay

pub mod config;
pub mod handlers;
pub mod parse;
pub mod rate_limit;
pub mod relay;
pub mod store;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

pub use config::ServerConfig;
use handlers::{route_request, AppState, RouteOutcome};
use parse::{error_response, find_header_end, parse_content_length, upgrade_response};

/// A bound rendezvous server, ready to run.
pub struct Server {
    listener: TcpListener,
    state: Arc<AppState>,
}

impl Server {
    /// Bind the configured address.
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let state = Arc::new(AppState::new(config));
        Ok(Self { listener, state })
    }

    /// The actual bound address (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever.
    pub async fn run(self) {
        if let Ok(addr) = self.local_addr() {
            info!(addr = %addr, "rendezvous server listening");
        }

        loop {
            let (socket, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    debug!(error = %e, "accept failed");
                    continue;
                }
            };

            let state = self.state.clone();
            tokio::spawn(async move {
                handle_connection(state, socket, peer_addr).await;
            });
        }
    }
}

async fn handle_connection(state: Arc<AppState>, mut socket: TcpStream, peer_addr: SocketAddr) {
    let max_request = state.config.max_request_bytes;
    let read_timeout = Duration::from_secs(state.config.request_read_timeout_secs);

    // Read until headers plus Content-Length worth of body have arrived.
    let mut buf = vec![0u8; max_request];
    let mut total_read = 0;
    let mut header_end;
    loop {
        let read = tokio::time::timeout(read_timeout, socket.read(&mut buf[total_read..])).await;
        let n = match read {
            Ok(Ok(0)) => return,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!(error = %e, "request read failed");
                return;
            }
            Err(_) => {
                debug!(ip = %peer_addr.ip(), "request read timed out");
                return;
            }
        };
        total_read += n;

        let data = &buf[..total_read];
        if let Some(end) = find_header_end(data) {
            header_end = end;
            let headers = String::from_utf8_lossy(&data[..end]);
            let content_length = parse_content_length(&headers);
            if end + content_length > max_request {
                let _ = socket
                    .write_all(error_response(400, "request too large").as_bytes())
                    .await;
                return;
            }
            if total_read >= end + content_length {
                break;
            }
        } else if total_read >= buf.len() {
            let _ = socket
                .write_all(error_response(400, "request too large").as_bytes())
                .await;
            return;
        }
    }

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = headers.lines();
    let Some(request_line) = lines.next() else {
        return;
    };
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
        let _ = socket
            .write_all(error_response(400, "malformed request").as_bytes())
            .await;
        return;
    };

    let content_length = parse_content_length(&headers);
    let body_end = (header_end + content_length).min(total_read);
    let body = String::from_utf8_lossy(&buf[header_end..body_end]).to_string();
    let ip = peer_addr.ip();

    match route_request(&state, method, path, &headers, &body, ip).await {
        RouteOutcome::Respond(response) => {
            if let Err(e) = socket.write_all(response.as_bytes()).await {
                debug!(error = %e, "failed to write response");
                return;
            }
            let _ = socket.shutdown().await;
        }
        RouteOutcome::Upgrade { room_id } => {
            if !state.relay.try_reserve(ip).await {
                warn!(ip = %ip, "signal: per-IP connection cap reached");
                let _ = socket
                    .write_all(error_response(429, "too many signaling connections").as_bytes())
                    .await;
                return;
            }
            if socket.write_all(upgrade_response().as_bytes()).await.is_err() {
                state.relay.release(ip).await;
                return;
            }
            // Bytes past the header end already belong to the signaling stream.
            let leftover = buf[header_end..total_read].to_vec();
            state
                .relay
                .serve_connection(socket, room_id, ip, leftover)
                .await;
        }
    }
}
